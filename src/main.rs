//! loanwatch: real-time monitor for BTC-collateralized loans

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use loanwatch::alerts::AlertEngine;
use loanwatch::bus::EventBus;
use loanwatch::config::AppConfig;
use loanwatch::notify::{Notifier, NoopNotifier, TelegramNotifier};
use loanwatch::oracle::OracleService;
use loanwatch::store::LoanStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("configuration failed")?;
    tracing::info!(config = %config.digest(), "starting loanwatch");

    let store = Arc::new(
        LoanStore::open(&config.persistence.data_dir).context("loan store failed to open")?,
    );
    let bus = Arc::new(EventBus::new());

    let notifier: Arc<dyn Notifier> = match &config.telegram.bot_token {
        Some(token) if config.telegram.enabled => {
            Arc::new(TelegramNotifier::new(&config.telegram.api_url, token)?)
        }
        _ => {
            tracing::warn!("no Telegram bot token configured; notifications disabled");
            Arc::new(NoopNotifier)
        }
    };

    let mut oracle = OracleService::new(config.oracle.clone(), bus.clone());
    oracle.start();

    AlertEngine::new(store.clone(), notifier, bus.clone()).spawn();

    // Keep the last validated price on the state surface
    {
        let store = store.clone();
        let mut updates = bus.subscribe_price_updates();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => store.set_last_price(update).await,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    #[cfg(feature = "dashboard")]
    if config.dashboard.enabled {
        let state = loanwatch::dashboard::AppState {
            store: store.clone(),
            bus: bus.clone(),
            health: oracle.health(),
            broadcaster: loanwatch::dashboard::DashboardBroadcaster::default(),
        };
        loanwatch::dashboard::spawn_price_bridge(bus.clone(), state.broadcaster.clone());
        let port = config.dashboard.port;
        tokio::spawn(async move {
            if let Err(e) = loanwatch::dashboard::start_server(state, port).await {
                tracing::error!(error = %e, "dashboard server failed");
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    oracle.stop();
    store.save().await?;
    Ok(())
}
