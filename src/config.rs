//! Configuration management for herakles-proc-monitor.
//!
//! Effective settings are resolved with the precedence CLI > config file >
//! built-in defaults. Config files may be YAML, JSON or TOML; the format is
//! picked from the file extension.

use clap::ValueEnum;
use herakles_proc_monitor::{MonitorConfig, SortKey, SortState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat, LogLevel, OutputFormat};

// Default configuration constants
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RETENTION_WINDOW_MS: u64 = 10_000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_INTERACTION_DEBOUNCE_MS: u64 = 5000;
pub const DEFAULT_HANG_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_ROOT_PID: u32 = 1;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

const DEFAULT_LOCATIONS: [&str; 6] = [
    "/etc/herakles/proc-monitor.yaml",
    "/etc/herakles/proc-monitor.yml",
    "/etc/herakles/proc-monitor.json",
    "./herakles-proc-monitor.yaml",
    "./herakles-proc-monitor.yml",
    "./herakles-proc-monitor.json",
];

/// Monitor configuration as read from file and CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Sampling and display timing
    pub sampling_interval_ms: Option<u64>,
    pub retention_window_ms: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
    pub interaction_debounce_ms: Option<u64>,
    pub hang_queue_capacity: Option<usize>,

    // Snapshot source
    pub root_pid: Option<u32>,
    pub proc_root: Option<PathBuf>,
    pub test_data_file: Option<PathBuf>,

    // Presentation
    /// Column key, or null for the default grouping
    #[serde(alias = "sort")]
    pub default_sort: Option<String>,
    pub default_sort_descending: Option<bool>,
    /// "table" | "json"
    pub output_format: Option<String>,

    // HTTP export
    pub enable_http: Option<bool>,
    pub bind: Option<String>,
    pub port: Option<u16>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_interval_ms: Some(DEFAULT_SAMPLING_INTERVAL_MS),
            retention_window_ms: Some(DEFAULT_RETENTION_WINDOW_MS),
            refresh_interval_ms: Some(DEFAULT_REFRESH_INTERVAL_MS),
            interaction_debounce_ms: Some(DEFAULT_INTERACTION_DEBOUNCE_MS),
            hang_queue_capacity: Some(DEFAULT_HANG_QUEUE_CAPACITY),
            root_pid: Some(DEFAULT_ROOT_PID),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            test_data_file: None,
            default_sort: None,
            default_sort_descending: Some(false),
            output_format: Some("table".into()),
            enable_http: Some(false),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            log_level: Some(DEFAULT_LOG_LEVEL.into()),
        }
    }
}

impl Config {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(
            self.sampling_interval_ms
                .unwrap_or(DEFAULT_SAMPLING_INTERVAL_MS),
        )
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_millis(
            self.retention_window_ms
                .unwrap_or(DEFAULT_RETENTION_WINDOW_MS),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(
            self.refresh_interval_ms
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
        )
    }

    pub fn interaction_debounce(&self) -> Duration {
        Duration::from_millis(
            self.interaction_debounce_ms
                .unwrap_or(DEFAULT_INTERACTION_DEBOUNCE_MS),
        )
    }

    pub fn output_format(&self) -> Result<OutputFormat, String> {
        match self.output_format.as_deref() {
            None => Ok(OutputFormat::Table),
            Some(s) => OutputFormat::from_str(s, true)
                .map_err(|_| format!("Invalid output_format '{}', expected 'table' or 'json'", s)),
        }
    }

    pub fn log_level(&self) -> Result<LogLevel, String> {
        let s = self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        LogLevel::from_str(s, true).map_err(|_| format!("Invalid log_level '{}'", s))
    }

    /// Initial sort selection.
    pub fn sort_state(&self) -> Result<SortState, Box<dyn std::error::Error>> {
        let ascending = !self.default_sort_descending.unwrap_or(false);
        Ok(match self.default_sort.as_deref() {
            None | Some("") | Some("default") => SortState {
                column: None,
                ascending,
            },
            Some(key) => SortState::by(key.parse::<SortKey>()?, ascending),
        })
    }

    /// Engine settings derived from this config.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
        Ok(MonitorConfig {
            sampling_interval: self.sampling_interval(),
            retention_window: self.retention_window(),
            refresh_interval: self.refresh_interval(),
            interaction_debounce: self.interaction_debounce(),
            hang_queue_capacity: self
                .hang_queue_capacity
                .unwrap_or(DEFAULT_HANG_QUEUE_CAPACITY),
            default_sort: self.sort_state()?,
        })
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let sampling = cfg.sampling_interval_ms.unwrap_or(DEFAULT_SAMPLING_INTERVAL_MS);
    let retention = cfg.retention_window_ms.unwrap_or(DEFAULT_RETENTION_WINDOW_MS);

    if sampling == 0 {
        return Err("sampling_interval_ms must be greater than 0".into());
    }
    if retention < sampling {
        return Err(format!(
            "retention_window_ms ({}) must not be shorter than sampling_interval_ms ({})",
            retention, sampling
        )
        .into());
    }
    if cfg.refresh_interval_ms == Some(0) {
        return Err("refresh_interval_ms must be greater than 0".into());
    }
    if cfg.hang_queue_capacity == Some(0) {
        return Err("hang_queue_capacity must be greater than 0".into());
    }

    // Source settings
    if cfg.root_pid == Some(0) {
        return Err("root_pid must be a real process id (> 0)".into());
    }
    if let Some(path) = &cfg.test_data_file {
        if !path.exists() {
            return Err(format!("test_data_file not found: {}", path.display()).into());
        }
    }

    cfg.sort_state()?;
    cfg.output_format()?;
    cfg.log_level()?;

    if cfg.enable_http.unwrap_or(false) {
        let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        if bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if args.root_pid.is_some() {
        config.root_pid = args.root_pid;
    }
    if let Some(proc_root) = &args.proc_root {
        config.proc_root = Some(proc_root.clone());
    }
    if let Some(path) = &args.test_data_file {
        config.test_data_file = Some(path.clone());
    }

    if args.sampling_interval_ms.is_some() {
        config.sampling_interval_ms = args.sampling_interval_ms;
    }
    if args.retention_window_ms.is_some() {
        config.retention_window_ms = args.retention_window_ms;
    }
    if args.refresh_interval_ms.is_some() {
        config.refresh_interval_ms = args.refresh_interval_ms;
    }

    if let Some(sort) = &args.sort {
        config.default_sort = Some(sort.clone());
    }
    if args.descending {
        config.default_sort_descending = Some(true);
    }
    if let Some(output) = args.output {
        config.output_format = Some(
            match output {
                OutputFormat::Table => "table",
                OutputFormat::Json => "json",
            }
            .to_string(),
        );
    }

    if args.http {
        config.enable_http = Some(true);
    }
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(format!("{:?}", level).to_lowercase());
    }

    Ok(config)
}

/// Loads a config file, or the first existing default location
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_LOCATIONS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Serializes a config in the requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
