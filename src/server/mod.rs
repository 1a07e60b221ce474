pub mod dns;
pub mod error;
pub mod handlers;
pub mod routes;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use dns::resolve_bind_addr;
use handlers::AppState;
use routes::{create_generate_routes, create_health_routes, create_stats_routes};

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(create_generate_routes())
        .merge(create_health_routes())
        .merge(create_stats_routes())
        .layer(cors)
        .with_state(state)
}

/// Serves the HTTP API until `shutdown` is cancelled, then lets in-flight
/// requests finish.
#[tracing::instrument(level = "info", name = "Server", skip(state, shutdown))]
pub async fn start_server(
    host: String,
    port: u16,
    ipv6: bool,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_app(state);

    let addr = resolve_bind_addr(&host, port, ipv6).await?;
    tracing::info!("Starting mermaid server at http://{}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server stopped accepting connections");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::InMemoryDiagramCache;
    use crate::generator::{Generator, RenderPaths};
    use crate::render::{RenderError, RenderJob, RenderOutput, Renderer};

    struct NoopRenderer;

    #[async_trait]
    impl Renderer for NoopRenderer {
        async fn render(&self, _job: &RenderJob) -> Result<RenderOutput, RenderError> {
            Ok(RenderOutput::default())
        }
    }

    #[tokio::test]
    async fn server_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let generator = Generator::new(
            Arc::new(InMemoryDiagramCache::new()),
            Arc::new(NoopRenderer),
            RenderPaths::new(dir.path().join("in"), dir.path().join("out")),
        );
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(start_server(
            "127.0.0.1".to_string(),
            0,
            false,
            AppState::new(Arc::new(generator)),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
