/// HTTP server setup using `axum`.
///
/// Provides `AppContext` (shared state), the router, and `ApiServer` (startup logic).
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex as TokioMutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::{config::Config, db::Db, embedder::Embedder};

/// Shared application context available to all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<TokioMutex<Db>>,
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
}

/// Build the application router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/vectorsearch", get(handlers::vector_search))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// HTTP server wrapping the context.
#[derive(Clone)]
pub struct ApiServer {
    pub ctx: AppContext,
}

impl ApiServer {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.ctx.config.host, self.ctx.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!("Listening on http://{addr}");

        axum::serve(listener, router(self.ctx))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server encountered an error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
