//! Liveness endpoint for orchestration platforms.
//!
//! Railway-style platforms kill containers whose health endpoint stops
//! answering, so this listener runs on its own task, entirely independent of
//! the conversion path: a wedged vendor call must not make the platform
//! recycle the bot.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::error::BotError;

/// Shared state for the health handlers.
pub struct HealthState {
    started: Instant,
}

impl HealthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
        })
    }

    fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Build the liveness router.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .with_state(state)
}

/// Root endpoint: plain-text banner.
async fn get_root() -> &'static str {
    "Telegram PDF to XLSX Converter Bot is running!"
}

/// Heartbeat endpoint polled by load balancers.
async fn get_health(State(state): State<Arc<HealthState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime": state.uptime_secs(),
        "service": "pdf2xlsx-bot",
    }))
}

/// Detailed status with the crate version.
async fn get_status(State(state): State<Arc<HealthState>>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "uptime_seconds": state.uptime_secs(),
        "service": "pdf2xlsx-bot",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Bind and serve the liveness endpoint until the process exits.
pub async fn serve(addr: &str, state: Arc<HealthState>) -> Result<(), BotError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| BotError::HealthBind {
                addr: addr.to_string(),
                source: e,
            })?;
    info!(%addr, "health server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| BotError::Internal(format!("health server: {e}")))
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_response_is_healthy() {
        let Json(body) = get_health(State(HealthState::new())).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "pdf2xlsx-bot");
    }

    #[tokio::test]
    async fn status_response_has_version() {
        let Json(body) = get_status(State(HealthState::new())).await;
        assert_eq!(body["status"], "running");
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn root_is_plain_text() {
        assert!(get_root().await.contains("running"));
    }
}
