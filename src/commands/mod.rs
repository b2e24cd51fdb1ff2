//! CLI command implementations for herakles-top.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: /proc and configuration validation
//! - `config`: Configuration file generation
//! - `generate`: Replay test data generation

pub mod check;
pub mod config;
pub mod generate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
