//! herakles-top - version 0.1.0
//!
//! Terminal process monitor with tracing logging.
//! This is the main entry point that resolves configuration, handles subcommands
//! and runs the periodic sampling loop.

mod cli;
mod commands;
mod config;
mod render;
mod startup_checks;

use clap::Parser;
use herakles_top::{CounterSource, ProcFs, ProcessSource, Replay, Sampler};
use std::io::Write;
use tokio::signal;
use tracing::{debug, error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_generate_testdata};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing logging subsystem with the resolved log level.
fn setup_logging(level: &LogLevel) {
    let log_level = match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };
    let Some(log_level) = log_level else {
        return;
    };

    // stderr keeps the table on stdout readable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Exits the process with error code 1 if validation fails.
fn ensure_valid(config: &Config) {
    if let Err(e) = validate_effective_config(config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
}

/// Environment the sampling loop reads from.
enum Source {
    Live(ProcFs),
    Replay(Replay),
}

impl ProcessSource for Source {
    fn enumerate(&mut self) -> Result<Vec<herakles_top::ProcEntry>, herakles_top::SourceError> {
        match self {
            Source::Live(s) => s.enumerate(),
            Source::Replay(s) => s.enumerate(),
        }
    }
}

impl CounterSource for Source {
    fn read_counters(&mut self) -> Result<herakles_top::CpuCounters, herakles_top::SourceError> {
        match self {
            Source::Live(s) => s.read_counters(),
            Source::Replay(s) => s.read_counters(),
        }
    }
}

fn open_source(config: &Config) -> Result<Source, Box<dyn std::error::Error>> {
    if let Some(test_file) = &config.test_data_file {
        info!("Using replay data from file: {}", test_file.display());
        return Ok(Source::Replay(Replay::from_file(test_file)?));
    }

    let root = config.proc_root();
    if let Err(e) = startup_checks::validate_requirements(&root) {
        error!("Startup validation failed: {}", e);
        error!("   Sampling will start but the table may stay empty!");
    }
    Ok(Source::Live(ProcFs::new(root)))
}

/// Runs the sampling loop until interrupted or the iteration budget is spent.
async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    let mut source = open_source(&config)?;
    let period = config.interval();
    let rows = config.rows();
    let iterations = config.iterations.unwrap_or(0);

    let mut sampler = Sampler::new(&mut source, config.irq_accounting(), period);
    sampler.set_sort(config.sort_key()?);

    info!(
        "Sampling every {} ms, {} rows per page",
        period.as_millis(),
        rows
    );

    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut s) => {
                    s.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    };
    tokio::pin!(shutdown_signal);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first delta spans a full period.
    ticker.tick().await;

    let mut done: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown_signal => break,
        }

        if let Err(e) = sampler.refresh(&mut source) {
            warn!("Skipping refresh: {}", e);
        }

        let page = render::render_page(&mut sampler, rows, chrono::Local::now());
        let mut stdout = std::io::stdout().lock();
        // clear screen, home cursor
        write!(stdout, "\x1b[2J\x1b[H{}", page)?;
        stdout.flush()?;

        done += 1;
        if iterations > 0 && done >= iterations {
            debug!("Iteration budget of {} reached", iterations);
            break;
        }
    }

    info!("herakles-top stopped after {} refreshes", done);
    Ok(())
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // CLI > config file > default
    let config = resolve_config(&args)?;
    setup_logging(&config.log_level());

    if let Some(command) = &args.command {
        return match command {
            Commands::Check => {
                ensure_valid(&config);
                command_check(&config)
            }

            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::GenerateTestdata {
                output,
                frames,
                processes,
            } => command_generate_testdata(output.clone(), *frames, *processes),
        };
    }

    ensure_valid(&config);
    info!("Starting herakles-top");
    run(config).await
}
