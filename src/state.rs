//! Application state management for the monitor.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and updated by the refresh loop.

use prometheus::{Gauge, Registry};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::FrameCache;
use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::metrics::MonitorMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and the refresh loop.
pub struct AppState {
    pub registry: Registry,
    pub metrics: MonitorMetrics,
    pub scrape_duration: Gauge,
    pub processes_total: Gauge,
    pub cycle_duration: Gauge,
    pub cycle_success: Gauge,
    pub cache: Arc<RwLock<FrameCache>>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
}

impl AppState {
    /// Creates the registry with all monitor and telemetry metrics.
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();
        let metrics = MonitorMetrics::new(&registry)?;

        let scrape_duration = Gauge::new(
            "herakles_proc_monitor_scrape_duration_seconds",
            "Time spent serving /metrics request (reading from cache)",
        )?;
        let processes_total = Gauge::new(
            "herakles_proc_monitor_processes_total",
            "Number of processes in the last published frame",
        )?;
        let cycle_duration = Gauge::new(
            "herakles_proc_monitor_cycle_duration_seconds",
            "Time spent in the last refresh cycle",
        )?;
        let cycle_success = Gauge::new(
            "herakles_proc_monitor_cycle_success",
            "Whether the last refresh cycle could read the process tree (1) or not (0)",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(processes_total.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(cycle_success.clone()))?;

        Ok(Self {
            registry,
            metrics,
            scrape_duration,
            processes_total,
            cycle_duration,
            cycle_success,
            cache: Arc::new(RwLock::new(FrameCache::default())),
            config: Arc::new(config),
            health_stats: Arc::new(HealthStats::new()),
        })
    }
}
