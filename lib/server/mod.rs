pub mod monitoring;
use crate::state::AppState;
use prometheus_client::encoding::text::encode;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use monitoring::CollectorMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

async fn health_handler() -> String {
    "Healthy".to_string()
}

async fn expose_metrics(state: State<Arc<AppState>>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(buffer)
}

/// Registers the collector and build-info metrics in the shared registry.
pub async fn register_metrics(state: &AppState) -> CollectorMetrics {
    let mut registry = state.registry.write().await;
    monitoring::register_build_info_metric(&mut registry, "collector");
    CollectorMetrics::register(&mut registry, "collector")
}

/// Starts the health/metrics HTTP server on the supplied socket address.
///
/// The server stops when `state.shutdown_token` is cancelled.
pub async fn setup_server_with_addr(
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    let shutdown_token = state.shutdown_token.clone();
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_handle = tokio::spawn(async move {
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await;
        if let Err(err) = served {
            error!(event = "metrics_server_failed", error = %err, "metrics server stopped");
        }
    });

    Ok(server_handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn serves_health_and_metrics() {
        let state = Arc::new(AppState::new(CancellationToken::new()));
        let metrics = register_metrics(&state).await;
        metrics.cycles_started_total.inc();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let addr = listener.local_addr().expect("probe addr");
        drop(listener);

        let handle = setup_server_with_addr(state.clone(), addr)
            .await
            .expect("server should bind");

        let health = reqwest::get(format!("http://{addr}/health"))
            .await
            .expect("health request")
            .text()
            .await
            .expect("health body");
        assert_eq!(health, "Healthy");

        let body = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .expect("metrics request")
            .text()
            .await
            .expect("metrics body");
        assert!(body.contains("collector_cycles_started_total 1"));
        assert!(body.contains("collector_build_info"));

        state.shutdown_token.cancel();
        handle.await.expect("server task should finish");
    }
}
