//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-top.yaml"));

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

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Top Configuration
# ==========================
#
# Sampling
# --------
# interval_ms: 2000            # Refresh period; also the divisor for per-process CPU%
# iterations: 0                # Refreshes before exit (0 = until interrupted)
# proc_root: "/proc"           # Proc filesystem root
# parallelism: null            # Parallel /proc readers (null = auto)
# irq_double_count: true       # Count irq ticks twice in the CPU sum (historic formula)
#
# Display
# -------
# rows: 25                     # Rows printed per refresh
# sort_field: "cpu"            # pid, cpu, mem, state
# sort_descending: true        # Sort direction
#
# Logging
# -------
# log_level: "warn"            # off, error, warn, info, debug, trace
#
# Testing
# -------
# test_data_file: null         # Replay JSON file used instead of /proc
"#;

    format!("{comments}\n{yaml}")
}
