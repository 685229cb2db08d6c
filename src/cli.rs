//! CLI arguments and subcommands for herakles-proc-monitor.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Frame output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-proc-monitor",
    about = "Per-process and per-thread CPU/memory activity monitor",
    long_about = "Per-process and per-thread CPU/memory activity monitor.\n\n\
                  Samples a process tree at a fixed interval, keeps a short time-windowed \
                  history and shows CPU rates, memory changes and thread activity per process, \
                  ordered by process kind or by a selected column. Optionally exports the \
                  current frame as Prometheus metrics.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io/herakles-proc-monitor - More info: https://www.herakles.io - Support: proc-mem@herakles.io"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Root process of the monitored tree (default: 1)
    #[arg(short = 'r', long)]
    pub root_pid: Option<u32>,

    /// procfs mount point
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Sampling interval in milliseconds
    #[arg(long)]
    pub sampling_interval_ms: Option<u64>,

    /// Retention window in milliseconds
    #[arg(long)]
    pub retention_window_ms: Option<u64>,

    /// Refresh interval in milliseconds
    #[arg(long)]
    pub refresh_interval_ms: Option<u64>,

    /// Initial sort column (pid, type, name, cpu-total, threads, memory-resident)
    #[arg(short = 's', long)]
    pub sort: Option<String>,

    /// Start with the sort direction reversed
    #[arg(long)]
    pub descending: bool,

    /// Frame output format
    #[arg(short = 'o', long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Stop after N refresh cycles (0 = run until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub iterations: u64,

    /// Serve /metrics and /health over HTTP
    #[arg(long)]
    pub http: bool,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (default: warn)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path to JSON test data file (uses synthetic data instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// List process type classification rules
    Types {
        /// Show the matched names and arguments of each rule
        #[arg(long)]
        verbose: bool,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of web content processes to generate
        #[arg(long, default_value_t = 4)]
        web_count: usize,

        /// Number of other special processes to generate
        #[arg(long, default_value_t = 3)]
        others_count: usize,

        /// Maximum threads per process
        #[arg(long, default_value_t = 8)]
        max_threads: usize,
    },
}
