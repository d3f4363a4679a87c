//! Liveness endpoint for hosting platforms that probe an HTTP port.
//!
//! - `/` - plain-text liveness line
//! - `/health` - JSON status with uptime

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::{net::TcpListener, time::Instant};

const SERVICE: &str = "release-relay";

#[derive(Clone)]
struct HealthState {
    start_time: Instant,
}

fn router() -> Router {
    let state = HealthState {
        start_time: Instant::now(),
    };
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Serve the health endpoints until the process exits.
pub async fn serve(addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "health server listening");
    axum::serve(listener, router()).await?;
    Ok(())
}

async fn root_handler() -> &'static str {
    "GitHub release relay bot is running"
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "service": SERVICE,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    });
    (StatusCode::OK, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_ok_with_uptime() {
        let state = Arc::new(HealthState {
            start_time: Instant::now(),
        });
        let resp = health_handler(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn serves_both_routes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router()).await });

        let root = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(root.text().await.unwrap(), "GitHub release relay bot is running");

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["service"], SERVICE);
        assert!(health["uptime_secs"].is_u64());
    }
}
