//! HTTP API over a [`Rag`] handle (requires the `server` feature).
//!
//! | Route              | Method | Purpose                                  |
//! |--------------------|--------|------------------------------------------|
//! | `/api/health`      | GET    | liveness and initialization status       |
//! | `/api/query`       | POST   | retrieval plus generated answer          |
//! | `/api/search`      | POST   | raw ranked passages, no generation       |
//!
//! The server may start before the index is ready. Until
//! [`AppState::initialize`] is called, health reports
//! `rag_initialized: false` and the query routes answer 503.

mod handlers;

use std::future::Future;
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::rag::Rag;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    rag: Arc<OnceLock<Arc<Rag>>>,
    default_top_k: usize,
    max_top_k: usize,
    request_timeout: Duration,
}

impl AppState {
    /// State with no handle yet; request limits come from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            rag: Arc::new(OnceLock::new()),
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
            request_timeout: config.request_timeout,
        }
    }

    /// State that is ready from the start.
    pub fn ready(rag: Arc<Rag>) -> Self {
        let state = Self::new(rag.config());
        state.initialize(rag);
        state
    }

    /// Publishes the handle to handlers. Returns false if one was already set.
    pub fn initialize(&self, rag: Arc<Rag>) -> bool {
        self.rag.set(rag).is_ok()
    }

    /// The handle, once initialized.
    pub fn rag(&self) -> Option<&Arc<Rag>> {
        self.rag.get()
    }

    /// Returns true once the handle is published.
    pub fn is_initialized(&self) -> bool {
        self.rag.get().is_some()
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health).fallback(handlers::method_not_allowed))
        .route("/api/query", post(handlers::query).fallback(handlers::method_not_allowed))
        .route("/api/search", post(handlers::search).fallback(handlers::method_not_allowed))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(handlers::cors))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}
