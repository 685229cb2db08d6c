//! Metrics endpoint handler for Prometheus scraping.
//!
//! Gauges are rebuilt from the last published frame on every scrape.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Initial encode buffer, enough for a few hundred processes.
const BUFFER_CAP: usize = 64 * 1024;

/// Why a scrape could not be answered.
#[derive(Debug)]
pub enum MetricsError {
    Encode(prometheus::Error),
    NotUtf8,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let body = match self {
            MetricsError::Encode(e) => format!("metrics encoding failed: {}", e),
            MetricsError::NotUtf8 => "metrics encoding produced invalid UTF-8".to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();

    let cache = state.cache.read().await;

    state.cycle_duration.set(cache.update_duration_seconds);
    state
        .cycle_success
        .set(if cache.update_success { 1.0 } else { 0.0 });

    let exported = match &cache.frame {
        Some(frame) => state.metrics.publish(frame),
        None => {
            state.metrics.reset();
            0
        }
    };
    drop(cache);

    state.processes_total.set(exported as f64);
    state.scrape_duration.set(start.elapsed().as_secs_f64());

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    if let Err(e) = TextEncoder::new().encode(&state.registry.gather(), &mut buffer) {
        error!("Failed to encode {} exported processes: {}", exported, e);
        return Err(MetricsError::Encode(e));
    }

    debug!(
        "Metrics request completed: {} processes, {} bytes, {:.3}ms",
        exported,
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::NotUtf8)
}
