//! Configuration management for herakles-top.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use clap::ValueEnum;
use herakles_top::{IrqAccounting, SortField, SortKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat, LogLevel};

// Default configuration constants
pub const DEFAULT_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_ROWS: usize = 25;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const MIN_INTERVAL_MS: u64 = 100;

/// Effective configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Sampling
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    pub iterations: Option<u64>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    pub parallelism: Option<usize>,
    /// Count the irq delta twice in the CPU interval sum (historic behaviour)
    #[serde(alias = "irq-double-count")]
    pub irq_double_count: Option<bool>,

    // Display
    pub rows: Option<usize>,
    #[serde(alias = "sort-field")]
    pub sort_field: Option<String>,
    #[serde(alias = "sort-descending")]
    pub sort_descending: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    /// Path to JSON replay file (uses recorded frames instead of /proc)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: Some(DEFAULT_INTERVAL_MS),
            iterations: Some(0),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            parallelism: None,
            irq_double_count: Some(true),
            rows: Some(DEFAULT_ROWS),
            sort_field: Some("cpu".into()),
            sort_descending: Some(true),
            log_level: Some("warn".into()),
            test_data_file: None,
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS))
    }

    pub fn rows(&self) -> usize {
        self.rows.unwrap_or(DEFAULT_ROWS)
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn irq_accounting(&self) -> IrqAccounting {
        if self.irq_double_count.unwrap_or(true) {
            IrqAccounting::DoubleCounted
        } else {
            IrqAccounting::Exact
        }
    }

    /// Effective log level; unknown names are rejected by validation, `warn` otherwise.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
            .unwrap_or(LogLevel::Warn)
    }

    /// Sort key, falling back to CPU descending when the field is missing.
    pub fn sort_key(&self) -> Result<SortKey, String> {
        let field = match self.sort_field.as_deref() {
            Some(s) => s.parse::<SortField>()?,
            None => SortField::Cpu,
        };
        Ok(SortKey::new(field, self.sort_descending.unwrap_or(true)))
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let interval_ms = cfg.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS);
    if interval_ms < MIN_INTERVAL_MS {
        return Err(format!(
            "interval_ms must be at least {} (got {})",
            MIN_INTERVAL_MS, interval_ms
        )
        .into());
    }

    if cfg.rows == Some(0) {
        return Err("rows must be greater than 0".into());
    }

    cfg.sort_key()?;

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    if let Some(path) = &cfg.test_data_file {
        if !path.exists() {
            return Err(format!("Test data file not found: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(ms) = args.interval_ms {
        config.interval_ms = Some(ms);
    }
    if let Some(n) = args.iterations {
        config.iterations = Some(n);
    }
    if let Some(rows) = args.rows {
        config.rows = Some(rows);
    }
    if let Some(sort) = &args.sort {
        config.sort_field = Some(sort.clone());
    }
    if args.ascending {
        config.sort_descending = Some(false);
    }
    if args.exact_irq {
        config.irq_double_count = Some(false);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(threads) = args.parallelism {
        config.parallelism = Some(threads);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level
            .to_possible_value()
            .map(|v| v.get_name().to_string());
    }

    // Test data file: CLI wins if provided
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/top.yaml",
            "/etc/herakles/top.yml",
            "/etc/herakles/top.json",
            "./herakles-top.yaml",
            "./herakles-top.yml",
            "./herakles-top.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    parse_config(&path, &fs::read_to_string(&path)?)
}

/// Parses config content, picking the format from the file extension (YAML default).
pub fn parse_config(path: &Path, content: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders configuration in the requested format
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
