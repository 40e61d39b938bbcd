//! Dashboard Module
//!
//! Read-only HTTP/WebSocket surface for loan holders. Possession of a
//! 48-hex loan token is the sole read authority. Only compiled when the
//! `dashboard` feature is enabled.

mod api;
mod types;
mod websocket;

pub use api::{create_router, AppState};
pub use types::*;
pub use websocket::DashboardBroadcaster;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::bus::EventBus;

/// Bridge bus price updates into the client broadcaster.
pub fn spawn_price_bridge(
    bus: Arc<EventBus>,
    broadcaster: DashboardBroadcaster,
) -> JoinHandle<()> {
    let mut updates = bus.subscribe_price_updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => broadcaster.broadcast_price(&update),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Start the dashboard server
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("🖥️ Dashboard API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
