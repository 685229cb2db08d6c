//! Config command implementation.
//!
//! Writes a default configuration file.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-proc-monitor.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Process Monitor Configuration
# ======================================
#
# Sampling and Display Timing
# ---------------------------
# sampling_interval_ms: 1000      # Minimum time between two snapshots
# retention_window_ms: 10000      # Snapshots older than this are evicted
# refresh_interval_ms: 2000       # Time between two refresh cycles
# interaction_debounce_ms: 5000   # Display pauses this long after interaction
# hang_queue_capacity: 64         # Pending hang reports per display pass
#
# Snapshot Source
# ---------------
# root_pid: 1                     # Root of the monitored process tree
# proc_root: "/proc"              # procfs mount point
# test_data_file: null            # Synthetic JSON data instead of procfs
#
# Presentation
# ------------
# default_sort: null              # pid, type, name, cpu-total, threads,
#                                 # memory-resident, or null for grouping
# default_sort_descending: false  # Start with the direction reversed
# output_format: "table"          # table or json
#
# HTTP Export
# -----------
# enable_http: false              # Serve /metrics and /health
# bind: "127.0.0.1"
# port: 9216
#
# Logging
# -------
# log_level: "warn"               # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
