//! probestat - per-(IP, domain) outcome statistics for censorship probe logs
//!
//! Reads a probe log, writes the retry file and AS summary, and prints the
//! rate summary to stdout. Ctrl-C stops reading input; whatever was
//! aggregated so far is still reported and written.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use probestat::config::EngineConfig;
use probestat::engine::{output, Analysis, RetryPredicate};
use probestat::metrics::metrics;
use probestat::structured_logging::RunLogger;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Probe log, one JSON record per line
    input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IP-to-AS database (.mmdb, or a CIDR table)
    #[arg(long)]
    asn_db: Option<PathBuf>,

    /// Output path for the per-AS summary
    #[arg(long)]
    asn_summary: Option<PathBuf>,

    /// Trials each (ip, domain) pair should have received
    #[arg(long)]
    expected_trials: Option<u64>,

    /// Output path for the retry list
    #[arg(long)]
    retry_file: Option<PathBuf>,

    /// Which keys count as fully failing
    #[arg(long, value_enum)]
    predicate: Option<RetryPredicate>,

    /// Classification worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Lines per classification batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Also write the full report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Write Prometheus metrics in text format at exit
    #[arg(long)]
    metrics_out: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(path) = &self.input {
            config.input_path = path.clone();
        }
        if let Some(path) = &self.asn_db {
            config.asn_db_path = path.clone();
        }
        if let Some(path) = &self.asn_summary {
            config.asn_summary_path = path.clone();
        }
        if let Some(n) = self.expected_trials {
            config.expected_trials = n;
        }
        if let Some(path) = &self.retry_file {
            config.retry_path = path.clone();
        }
        if let Some(predicate) = self.predicate {
            config.retry_predicate = predicate;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(path) = &self.report_json {
            config.report_json_path = Some(path.clone());
        }
        if let Some(path) = &self.metrics_out {
            config.metrics_path = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    let mut config =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let logger = RunLogger::fresh();
    info!(run_id = %logger.run_id(), version = env!("CARGO_PKG_VERSION"), "Starting probestat");

    let metrics_path = config.metrics_path.clone();
    let analysis = Analysis::new(config, logger);
    let cancel = analysis.cancel_flag();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing with data read so far");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || analysis.run())
        .await
        .context("Analysis task failed")??;

    print!("{}", outcome.report.to_console_text());

    if let Some(path) = metrics_path {
        let text = metrics()
            .encode_text()
            .map_err(|e| anyhow!("Failed to encode metrics: {}", e))?;
        output::write_atomic(&path, text.as_bytes())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "probestat=debug,info"
    } else {
        "probestat=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    // Logs go to stderr so the summary on stdout stays clean
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
