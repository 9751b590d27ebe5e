//! pgstat - PostgreSQL `pg_stat_database` poller.
//!
//! Runs the registered input plugins every interval and writes the collected
//! points to stdout in InfluxDB line protocol.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pgstat::collector::{self, PLUGIN_NAME, PostgresqlConfig, Target};
use pgstat::config::{AgentConfig, ConfigError};
use pgstat::plugin::{Plugin, Registry};
use pgstat::sink::{MetricPoint, Recorder};

/// PostgreSQL pg_stat_database poller.
#[derive(Parser)]
#[command(name = "pgstat", about = "PostgreSQL pg_stat_database poller", version)]
struct Args {
    /// Path to the TOML agent configuration.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server connection string (repeatable). Replaces configured servers.
    #[arg(short, long = "address", value_name = "CONNSTR")]
    addresses: Vec<String>,

    /// Database to report (repeatable), applied to every --address.
    #[arg(short, long = "database", value_name = "NAME", requires = "addresses")]
    databases: Vec<String>,

    /// Collection interval in seconds; 0 runs a single pass.
    /// Defaults to the configured interval.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr; stdout carries the metric lines.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("pgstat={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Merges config file and CLI overrides.
fn load_config(args: &Args) -> Result<AgentConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    if !args.addresses.is_empty() {
        let servers = args
            .addresses
            .iter()
            .map(|address| Target::new(address.as_str()).with_databases(args.databases.iter().cloned()))
            .collect();
        let section = toml::Table::try_from(PostgresqlConfig { servers }).map_err(|e| {
            ConfigError::Plugin {
                name: PLUGIN_NAME.to_string(),
                message: e.to_string(),
            }
        })?;
        config.plugins.insert(PLUGIN_NAME.to_string(), section);
    }

    if let Some(interval) = args.interval {
        config.agent.interval_secs = interval;
    }

    Ok(config)
}

fn write_points(points: &[MetricPoint]) -> io::Result<()> {
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for point in points {
        match point.to_line(timestamp) {
            Some(line) => writeln!(out, "{}", line)?,
            None => warn!(
                "Skipping {} {:?}: value is not finite",
                point.measurement, point.tags
            ),
        }
    }
    out.flush()
}

/// Runs one pass over every plugin. Returns false if any plugin failed.
fn run_pass(plugins: &[(&'static str, Box<dyn Plugin>)], pass: u64) -> bool {
    let mut recorder = Recorder::new();
    let mut ok = true;

    for (name, plugin) in plugins {
        if let Err(e) = plugin.gather(&mut recorder) {
            error!("Pass #{}: {} failed: {}", pass, name, e);
            ok = false;
        }
    }

    let points = recorder.drain();
    info!("Pass #{}: {} points", pass, points.len());
    if let Err(e) = write_points(&points) {
        error!("Failed to write points: {}", e);
        ok = false;
    }
    ok
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let mut registry = Registry::new();
    collector::register(&mut registry);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.check_plugins(&registry) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let mut plugins = Vec::new();
    for name in registry.names() {
        match config.build_plugin(&registry, name) {
            Ok(plugin) => plugins.push((name, plugin)),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    info!("pgstat {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, plugins={}",
        config.agent.interval_secs,
        plugins
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(",")
    );

    if config.agent.interval_secs == 0 {
        return if run_pass(&plugins, 1) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let interval = config.agent.interval();

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop");

    let mut pass: u64 = 0;
    while running.load(Ordering::SeqCst) {
        pass += 1;
        if !run_pass(&plugins, pass) {
            debug!("Pass #{} incomplete, next attempt in {}s", pass, interval.as_secs());
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
