//! CLI arguments and subcommands for herakles-top.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
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

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-top",
    about = "Terminal process monitor with per-process and system-wide CPU usage",
    long_about = "Terminal process monitor with per-process and system-wide CPU usage.\n\n\
                  Samples /proc on a fixed period, computes CPU tick deltas between \
                  consecutive samples and prints a sorted page of the process table \
                  together with task state counts and the system CPU breakdown.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    long_version = concat!(
        "0.1.0 (",
        env!("VERGEN_GIT_SHA"),
        " built ",
        env!("VERGEN_BUILD_TIMESTAMP"),
        ")"
    ),
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-top — More info: https://www.herakles.now — Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Refresh period in milliseconds
    #[arg(short = 'd', long)]
    pub interval_ms: Option<u64>,

    /// Number of refreshes before exiting (0 = until interrupted)
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// Rows printed per refresh
    #[arg(short = 'r', long)]
    pub rows: Option<usize>,

    /// Sort field (pid, cpu, mem, state)
    #[arg(short = 's', long)]
    pub sort: Option<String>,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,

    /// Count the irq delta once in the CPU interval sum
    #[arg(long)]
    pub exact_irq: bool,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Parallel /proc reader threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Log level (overrides the config file, default: warn)
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

    /// Path to JSON replay file (uses recorded frames instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and /proc accessibility
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

    /// Generate a synthetic replay JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of frames to generate
        #[arg(long, default_value_t = 10)]
        frames: usize,

        /// Number of processes alive in the first frame
        #[arg(long, default_value_t = 40)]
        processes: usize,
    },
}
