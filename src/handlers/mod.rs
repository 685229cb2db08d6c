//! HTTP endpoint handlers for the monitor.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Health check endpoint

pub mod health;
pub mod metrics;

// Re-export handlers
pub use health::health_handler;
pub use metrics::metrics_handler;

use axum::{routing::get, Router};

use crate::state::SharedState;

/// Builds the HTTP router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
