//! Gateway HTTP server (single port): `GET /` health and `POST /telegram/webhook`.

use crate::channels::{parse_update, TelegramUpdate, UpdateDispatcher};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";
pub const WEBHOOK_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub port: u16,
    /// When Some, webhook POSTs must carry this value in [`WEBHOOK_SECRET_HEADER`].
    pub webhook_secret: Option<String>,
    pub dispatcher: Arc<UpdateDispatcher>,
}

pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(WEBHOOK_PATH, post(telegram_webhook))
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn serve(bind: &str, state: GatewayState, cancel: CancellationToken) -> Result<()> {
    let bind_addr = format!("{}:{}", bind.trim(), state.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// POST /telegram/webhook: verify the optional secret, parse the update, queue it for its chat.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            log::warn!("gateway: webhook call with wrong secret");
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            log::debug!("gateway: malformed webhook body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if state.dispatcher.cancel_token().is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match parse_update(&update) {
        Some(incoming) => state.dispatcher.submit(incoming).await,
        None => log::debug!("gateway: ignoring update {}", update.update_id),
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}
