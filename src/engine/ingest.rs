//! Ingestion pipeline: read -> parse -> classify -> aggregate
//!
//! Lines are read in batches. With more than one worker a batch is split into
//! contiguous chunks that are parsed and classified on scoped threads; results
//! are then folded into the aggregator on the calling thread in original line
//! order, so the aggregator has a single writer and first-appearance order
//! does not depend on the worker count.

use super::aggregator::{Aggregator, UnderSampledKey};
use super::classifier::classify;
use super::errors::{MalformedRecord, ProbeStatError, Result};
use super::outcome::Outcome;
use super::record::ProbeRecord;
use crate::metrics::{metrics, Timer};
use crate::structured_logging::RunLogger;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Knobs for one ingestion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Classification threads; 1 means fully sequential
    pub workers: usize,
    /// Lines handed to the workers at a time
    pub batch_size: usize,
    /// Trials each key was supposed to receive
    pub expected_trials: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 4096,
            expected_trials: 1,
        }
    }
}

/// Line-level counters so dropped and unclassified data stays auditable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub malformed: u64,
    pub observed: u64,
    pub unclassified: u64,
    /// Input was abandoned early; counters cover what was read
    pub cancelled: bool,
}

/// Terminal state of one ingestion pass
#[derive(Debug)]
pub struct Ingestion {
    pub aggregator: Aggregator,
    pub stats: IngestStats,
    pub under_sampled: Vec<UnderSampledKey>,
}

#[derive(Debug)]
enum LineOutcome {
    Blank,
    Malformed(MalformedRecord),
    Observed(ProbeRecord, Outcome),
}

fn process_line(line: &str) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Blank;
    }
    match ProbeRecord::parse_line(line) {
        Ok(record) => {
            let outcome = classify(&record);
            LineOutcome::Observed(record, outcome)
        }
        Err(reason) => LineOutcome::Malformed(reason),
    }
}

struct RawLine {
    line_no: u64,
    text: std::result::Result<String, MalformedRecord>,
}

impl RawLine {
    fn decode(line_no: u64, bytes: Vec<u8>) -> Self {
        let text = String::from_utf8(bytes)
            .map_err(|e| MalformedRecord::InvalidUtf8(e.utf8_error().to_string()));
        Self { line_no, text }
    }

    fn process(&self) -> LineOutcome {
        match &self.text {
            Ok(text) => process_line(text),
            Err(reason) => LineOutcome::Malformed(reason.clone()),
        }
    }

    fn echo(&self) -> &str {
        self.text.as_deref().unwrap_or("<invalid utf-8>")
    }
}

/// Drives one pass over a probe log
#[derive(Debug, Clone)]
pub struct Ingestor {
    options: IngestOptions,
    logger: RunLogger,
    cancel: Arc<AtomicBool>,
}

impl Ingestor {
    pub fn new(options: IngestOptions, logger: RunLogger) -> Self {
        Self {
            options,
            logger,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Open `path` and ingest it; failing to open is fatal
    pub fn ingest_path(&self, path: &Path) -> Result<Ingestion> {
        let file = File::open(path).map_err(|e| ProbeStatError::io(path, e))?;
        self.ingest_reader(BufReader::new(file), path)
    }

    /// Ingest newline-delimited records from any buffered reader
    ///
    /// `source` is only used to label I/O errors.
    pub fn ingest_reader<R: BufRead>(&self, mut reader: R, source: &Path) -> Result<Ingestion> {
        let timer = Timer::new();
        let batch_size = self.options.batch_size.max(1);
        let mut aggregator = Aggregator::new();
        let mut stats = IngestStats::default();
        let mut batch: Vec<RawLine> = Vec::with_capacity(batch_size);
        let mut buf = Vec::new();
        let mut line_no = 0u64;
        let mut eof = false;

        while !eof {
            if self.cancel.load(Ordering::Relaxed) {
                stats.cancelled = true;
                break;
            }

            batch.clear();
            while batch.len() < batch_size {
                buf.clear();
                let n = reader
                    .read_until(b'\n', &mut buf)
                    .map_err(|e| ProbeStatError::io(source, e))?;
                if n == 0 {
                    eof = true;
                    break;
                }
                line_no += 1;
                batch.push(RawLine::decode(line_no, std::mem::take(&mut buf)));
            }

            #[cfg(feature = "perf")]
            let batch_timer = Timer::new();
            let results = self.classify_batch(&batch)?;
            #[cfg(feature = "perf")]
            tracing::debug!(
                lines = batch.len(),
                elapsed_secs = batch_timer.elapsed_secs(),
                "Classified batch"
            );
            for (raw, result) in batch.iter().zip(results) {
                self.apply(&mut aggregator, &mut stats, raw, result);
            }
        }

        let under_sampled = aggregator.under_sampled(self.options.expected_trials);
        for short in &under_sampled {
            self.logger
                .log_under_sampled(&short.key, short.seen, short.expected);
        }

        self.logger.log_ingest_finished(
            stats.lines_read,
            stats.observed,
            stats.malformed,
            stats.cancelled,
        );
        timer.observe_duration(&metrics().ingest_duration);

        Ok(Ingestion {
            aggregator,
            stats,
            under_sampled,
        })
    }

    fn classify_batch(&self, batch: &[RawLine]) -> Result<Vec<LineOutcome>> {
        let workers = self.options.workers.max(1);
        if workers == 1 || batch.len() < 2 {
            return Ok(batch.iter().map(RawLine::process).collect());
        }

        let chunk_len = batch.len().div_ceil(workers);
        crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .chunks(chunk_len)
                .map(|chunk| {
                    scope.spawn(move |_| chunk.iter().map(RawLine::process).collect::<Vec<_>>())
                })
                .collect();

            let mut out = Vec::with_capacity(batch.len());
            for handle in handles {
                out.extend(handle.join().map_err(|_| ProbeStatError::WorkerPanicked)?);
            }
            Ok(out)
        })
        .map_err(|_| ProbeStatError::WorkerPanicked)?
    }

    fn apply(
        &self,
        aggregator: &mut Aggregator,
        stats: &mut IngestStats,
        raw: &RawLine,
        result: LineOutcome,
    ) {
        let m = metrics();
        stats.lines_read += 1;
        m.lines_read.inc();

        match result {
            LineOutcome::Blank => {
                stats.blank_lines += 1;
                debug!(line_no = raw.line_no, "Skipping blank line");
            }
            LineOutcome::Malformed(reason) => {
                stats.malformed += 1;
                m.records_malformed.inc();
                self.logger.log_malformed_line(raw.line_no, raw.echo(), &reason);
            }
            LineOutcome::Observed(record, outcome) => {
                if outcome == Outcome::Unclassified {
                    stats.unclassified += 1;
                    m.outcomes_unclassified.inc();
                    self.logger.log_unclassified(raw.line_no, &record);
                }
                stats.observed += 1;
                m.records_observed.inc();
                m.outcomes.with_label_values(&[outcome.name()]).inc();
                aggregator.observe(&record, outcome);
            }
        }
    }
}
