//! End-to-end analysis run: stage outputs, ingest, select retries, enrich,
//! report, publish

use super::asn::{open_asn_database, AsEnricher, AsnLookup};
use super::errors::Result;
use super::ingest::{IngestOptions, Ingestion, Ingestor};
use super::output::RunOutputs;
use super::report::{render, ReportDocument, ReportInputs};
use super::retry::{select_retries, RetrySet};
use crate::config::EngineConfig;
use crate::structured_logging::RunLogger;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

/// Terminal state of a run, after every output file has been written
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub ingestion: Ingestion,
    pub retries: RetrySet,
    pub report: ReportDocument,
}

/// Analysis driver bound to one validated configuration
pub struct Analysis {
    config: EngineConfig,
    logger: RunLogger,
    cancel: Arc<AtomicBool>,
}

impl Analysis {
    pub fn new(config: EngineConfig, logger: RunLogger) -> Self {
        Self {
            config,
            logger,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops ingestion at the next batch boundary when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run against the AS database named in the configuration
    pub fn run(&self) -> Result<AnalysisOutcome> {
        let lookup = open_asn_database(&self.config.asn_db_path)?;
        self.run_with_lookup(lookup)
    }

    /// Run with an already loaded AS lookup backend
    pub fn run_with_lookup(&self, lookup: Box<dyn AsnLookup>) -> Result<AnalysisOutcome> {
        let cfg = &self.config;
        info!(
            run_id = %self.logger.run_id(),
            input = %cfg.input_path.display(),
            predicate = %cfg.retry_predicate,
            workers = cfg.workers,
            "Starting analysis"
        );

        // Unusable output locations fail here, before any input is read
        let outputs = RunOutputs::stage(
            &cfg.retry_path,
            &cfg.asn_summary_path,
            cfg.report_json_path.as_deref(),
        )?;

        let options = IngestOptions {
            workers: cfg.workers,
            batch_size: cfg.batch_size,
            expected_trials: cfg.expected_trials,
        };
        let ingestion = Ingestor::new(options, self.logger.clone())
            .with_cancel_flag(self.cancel_flag())
            .ingest_path(&cfg.input_path)?;

        let predicate = cfg.retry_predicate;
        let retries = select_retries(&ingestion.aggregator, |stats| predicate.matches(stats));

        let enricher = AsEnricher::new(lookup, self.logger.clone());
        let report = render(
            ReportInputs {
                run_id: self.logger.run_id(),
                aggregator: &ingestion.aggregator,
                ingest: &ingestion.stats,
                under_sampled_keys: ingestion.under_sampled.len() as u64,
                predicate,
                retries: &retries,
            },
            &enricher,
        );

        outputs.commit(&retries, &report)?;

        Ok(AnalysisOutcome {
            ingestion,
            retries,
            report,
        })
    }
}
