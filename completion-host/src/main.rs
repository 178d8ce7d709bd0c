//! Completion Host CLI Application
//!
//! A stand-in for an asynchronous client library that only understands the
//! `(param, result, code)` completion shape. It uses the completion-trampoline
//! library and adds:
//! - Loading the trampoline in-process or from a shared library
//! - A worker pool that fires completions from its own threads
//! - TOML-configured operations (codes, result payloads, repeated delivery)
//! - Report generation (TXT/JSON)

use anyhow::{Context, Result};
use clap::Parser;
use completion_trampoline::FaultPolicy;
use std::fs;
use std::path::PathBuf;

mod config;
mod host;
mod loader;
mod report;

use config::HostConfig;
use host::SimulatedHost;
use loader::HostCallback;
use report::HostReport;

/// Completion Host - fire asynchronous completions through the trampoline
#[derive(Parser, Debug)]
#[command(name = "completion-host")]
#[command(about = "Simulate an async host delivering completions through the trampoline", long_about = None)]
#[command(version)]
struct Args {
    /// Path to host configuration file (host.toml); built-in demo operations if omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shared library exporting init_checked (overrides host.library).
    /// Faults inside the library are not logged here; the report counts rejected deliveries
    #[arg(short, long, value_name = "FILE")]
    library: Option<PathBuf>,

    /// Number of completion worker threads (overrides host.workers)
    #[arg(short, long, value_name = "COUNT")]
    workers: Option<usize>,

    /// Fault policy of the checked trampoline: log or abort (overrides host.fault_policy)
    #[arg(long, value_name = "POLICY", value_parser = parse_fault_policy)]
    fault_policy: Option<FaultPolicy>,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Output file for the report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Completion Host CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using trampoline library v{}", completion_trampoline::VERSION);

    let config = resolve_config(&args)?;

    let callback = match &config.host.library {
        Some(path) => HostCallback::from_library(path, config.host.fault_policy)?,
        None => HostCallback::in_process(config.host.fault_policy),
    };

    let host = SimulatedHost::new(config.host.workers, callback)?;
    let outcomes = host.run(&config.operations);

    let report = HostReport::new(
        host.callback().source(),
        config.host.fault_policy,
        config.host.workers,
        outcomes,
    );
    let rendered = if args.json {
        report.to_json()?
    } else {
        report.to_text()
    };

    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report: {:?}", path))?;
            log::info!("Report written to {:?}", path);
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

/// Load the config file (or the demo set) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<HostConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => {
            log::info!("No configuration given, running demo operations");
            HostConfig::demo()
        }
    };

    if let Some(library) = &args.library {
        config.host.library = Some(library.clone());
    }
    if let Some(workers) = args.workers {
        config.host.workers = workers;
    }
    if let Some(policy) = args.fault_policy {
        config.host.fault_policy = policy;
    }

    config.validate()?;
    log::debug!("Configuration resolved: {:?}", config.host);
    Ok(config)
}

fn parse_fault_policy(value: &str) -> std::result::Result<FaultPolicy, String> {
    match value.to_ascii_lowercase().as_str() {
        "log" => Ok(FaultPolicy::Log),
        "abort" => Ok(FaultPolicy::Abort),
        other => Err(format!("unknown fault policy '{}' (expected log or abort)", other)),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault_policy() {
        assert_eq!(parse_fault_policy("log"), Ok(FaultPolicy::Log));
        assert_eq!(parse_fault_policy("ABORT"), Ok(FaultPolicy::Abort));
        assert!(parse_fault_policy("retry").is_err());
    }

    #[test]
    fn test_overrides_apply_to_demo_config() {
        let args = Args::parse_from(["completion-host", "--workers", "3", "--fault-policy", "log"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.host.workers, 3);
        assert_eq!(config.host.fault_policy, FaultPolicy::Log);
        assert_eq!(config.operations.len(), 3);
    }

    #[test]
    fn test_abort_policy_rejected_for_demo_config() {
        // The demo fires one completion twice, which would abort the host
        let args = Args::parse_from(["completion-host", "--fault-policy", "abort"]);
        let err = resolve_config(&args).unwrap_err();
        assert!(err.to_string().contains("would abort the host"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let args = Args::parse_from(["completion-host", "--workers", "0"]);
        assert!(resolve_config(&args).is_err());
    }
}
