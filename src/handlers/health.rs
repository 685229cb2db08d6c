//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! refresh cycle statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::config::{DEFAULT_PROC_ROOT, DEFAULT_ROOT_PID};
use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/herakles-io/herakles-proc-monitor - More info: https://www.herakles.io - Support: proc-mem@herakles.io";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let cache = state.cache.read().await;

    // Derive HTTP status from the last cycle
    let status = if cache.update_success && cache.last_updated.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if cache.update_success {
        format!("OK - {} processes", cache.process_count())
    } else if cache.last_updated.is_none() {
        "Waiting for first cycle".to_string()
    } else {
        "Process tree unavailable".to_string()
    };
    drop(cache);

    let source = match &state.config.test_data_file {
        Some(path) => format!("test data {}", path.display()),
        None => format!(
            "pid {} under {}",
            state.config.root_pid.unwrap_or(DEFAULT_ROOT_PID),
            state
                .config
                .proc_root
                .as_deref()
                .map_or_else(|| DEFAULT_PROC_ROOT.to_string(), |p| p.display().to_string())
        ),
    };
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\nsource: {source}\n\n{table}\n{FOOTER_TEXT}"),
    )
}
