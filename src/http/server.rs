//! HTTP Server
//!
//! Builds the router and serves it until shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::Result;

use super::handlers;

/// State shared by all request handlers
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the application router
pub fn app(engine: Arc<Engine>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route(
            "/v1/{key}",
            get(handlers::get_handler)
                .put(handlers::put_handler)
                .delete(handlers::delete_handler)
                .fallback(handlers::not_allowed_handler),
        )
        .route("/v1", any(handlers::not_allowed_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

/// Serve requests on `listener` until `shutdown` resolves
///
/// In-flight requests finish before this returns. Closing the engine is
/// left to the caller.
pub async fn serve<F>(listener: TcpListener, engine: Arc<Engine>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "accepting HTTP traffic");

    axum::serve(listener, app(engine))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
