//! Dashboard HTTP API
//!
//! Read-only REST endpoints plus the price WebSocket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::websocket::DashboardBroadcaster;
use crate::bus::EventBus;
use crate::oracle::OracleHealth;
use crate::store::LoanStore;
use crate::types::SystemEventKind;
use crate::risk;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LoanStore>,
    pub bus: Arc<EventBus>,
    pub health: OracleHealth,
    pub broadcaster: DashboardBroadcaster,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/price", get(get_price))
        .route("/api/loan/:token", get(get_loan))
        .route("/api/health", get(get_health))
        .route("/api/events", get(get_events))
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state(state)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /api/price - Last validated price update
async fn get_price(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_last_price().await {
        Some(update) => Json(ApiResponse::success(update)),
        None => Json(ApiResponse::error("no price observed yet")),
    }
}

/// GET /api/loan/:token - Loan snapshot; the token is the authority
async fn get_loan(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if token.len() != 48 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Json(ApiResponse::error("invalid loan token"));
    }
    let Some(loan) = state.store.get_loan(&token).await else {
        return Json(ApiResponse::error("unknown loan token"));
    };

    let last_price = state.store.get_last_price().await;
    let btc_price = last_price.as_ref().map(|u| u.price);
    let current_ltv = btc_price.and_then(|p| risk::current_ltv(&loan, p));

    Json(ApiResponse::success(LoanStatusResponse {
        margin_call_price: risk::margin_call_price(&loan),
        liquidation_price: risk::liquidation_price(&loan),
        btc_price,
        current_ltv,
        risk_tier: current_ltv.map(|ltv| risk::risk_tier(&loan, ltv)),
        price_updated_at: last_price.as_ref().map(|u| u.timestamp),
        token: loan.token,
        loan_amount_usd: loan.loan_amount_usd,
        btc_collateral: loan.btc_collateral,
        margin_call_ltv: loan.margin_call_ltv,
        liquidation_ltv: loan.liquidation_ltv,
        interest_rate_pct: loan.interest_rate_pct,
        end_date: loan.end_date.map(|d| d.to_rfc3339()),
        lender: loan.lender,
    }))
}

/// GET /api/health - Per-source feed health
async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.health.snapshot()))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    kind: Option<String>,
}

/// GET /api/events?kind=CIRCUIT_BREAKER - Recent system events
async fn get_events(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => {
            let parsed: Result<SystemEventKind, _> =
                serde_json::from_value(serde_json::Value::String(raw.to_uppercase()));
            match parsed {
                Ok(kind) => Some(kind),
                Err(_) => return Json(ApiResponse::error("unknown event kind")),
            }
        }
    };
    Json(ApiResponse::success(state.bus.recent_system_events(kind)))
}

/// GET /ws - Price update stream
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster.clone()))
}

async fn handle_socket(socket: WebSocket, broadcaster: DashboardBroadcaster) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                // Inbound frames are ignored; the stream is one-way
                Some(Ok(_)) => continue,
                _ => break,
            },
        }
    }
}
