//! Run configuration with TOML file and environment variable support
//!
//! Precedence, lowest first: defaults, TOML file, `PROBESTAT_*` variables,
//! command-line flags (applied by the binary).

use crate::engine::retry::RetryPredicate;
use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Validated inputs for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Newline-delimited probe log
    pub input_path: PathBuf,

    /// IP-to-AS database (`.mmdb` or CIDR table)
    pub asn_db_path: PathBuf,

    /// Per-AS failing/fine rollup output
    pub asn_summary_path: PathBuf,

    /// Trials each (ip, domain) pair was supposed to receive
    pub expected_trials: u64,

    /// `ip, domain` lines to re-probe
    pub retry_path: PathBuf,

    /// Which keys count as fully failing
    pub retry_predicate: RetryPredicate,

    /// Classification worker threads
    pub workers: usize,

    /// Lines per classification batch
    pub batch_size: usize,

    /// Optional pretty JSON copy of the report
    pub report_json_path: Option<PathBuf>,

    /// Optional Prometheus text dump written at end of run
    pub metrics_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("probes.jsonl"),
            asn_db_path: PathBuf::from("GeoLite2-ASN.mmdb"),
            asn_summary_path: PathBuf::from("asn_summary.txt"),
            expected_trials: 3,
            retry_path: PathBuf::from("retry.txt"),
            retry_predicate: RetryPredicate::AllErrored,
            workers: 1,
            batch_size: 4096,
            report_json_path: None,
            metrics_path: None,
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).map(PathBuf::from)
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| anyhow!("Failed to parse TOML config: {}", e))?;

        Ok(config)
    }

    /// Apply `PROBESTAT_*` environment overrides
    pub fn from_env(&mut self) -> Result<()> {
        if let Some(path) = env_path("PROBESTAT_INPUT") {
            self.input_path = path;
        }
        if let Some(path) = env_path("PROBESTAT_ASN_DB") {
            self.asn_db_path = path;
        }
        if let Some(path) = env_path("PROBESTAT_ASN_SUMMARY") {
            self.asn_summary_path = path;
        }
        if let Some(path) = env_path("PROBESTAT_RETRY_FILE") {
            self.retry_path = path;
        }
        if let Some(path) = env_path("PROBESTAT_REPORT_JSON") {
            self.report_json_path = Some(path);
        }
        if let Some(path) = env_path("PROBESTAT_METRICS_FILE") {
            self.metrics_path = Some(path);
        }
        if let Some(n) = env_parse("PROBESTAT_EXPECTED_TRIALS")? {
            self.expected_trials = n;
        }
        if let Some(n) = env_parse("PROBESTAT_WORKERS")? {
            self.workers = n;
        }
        if let Some(n) = env_parse("PROBESTAT_BATCH_SIZE")? {
            self.batch_size = n;
        }
        if let Ok(value) = std::env::var("PROBESTAT_RETRY_PREDICATE") {
            self.retry_predicate = <RetryPredicate as ValueEnum>::from_str(&value, false)
                .map_err(|e| anyhow!("Invalid PROBESTAT_RETRY_PREDICATE: {}", e))?;
        }
        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("input_path", &self.input_path),
            ("asn_db_path", &self.asn_db_path),
            ("asn_summary_path", &self.asn_summary_path),
            ("retry_path", &self.retry_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        if self.expected_trials == 0 {
            return Err(anyhow!("expected_trials must be > 0"));
        }
        if self.workers == 0 {
            return Err(anyhow!("workers must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be > 0"));
        }
        let outputs = [
            ("retry_path", Some(&self.retry_path)),
            ("asn_summary_path", Some(&self.asn_summary_path)),
            ("report_json_path", self.report_json_path.as_ref()),
            ("metrics_path", self.metrics_path.as_ref()),
        ];
        let outputs: Vec<(&str, &PathBuf)> = outputs
            .into_iter()
            .filter_map(|(name, path)| path.map(|p| (name, p)))
            .collect();
        for (i, (name, path)) in outputs.iter().enumerate() {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
            if *path == &self.input_path {
                return Err(anyhow!("{} must differ from input_path", name));
            }
            if let Some((other, _)) = outputs[..i].iter().find(|(_, p)| p == path) {
                return Err(anyhow!("{} and {} must differ", other, name));
            }
        }
        Ok(())
    }

    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.from_env()?;
        Ok(config)
    }
}
