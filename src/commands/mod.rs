//! CLI command implementations for herakles-proc-monitor.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `types`: Process type rule listing
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;
pub mod types;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use types::command_types;
