//! Structured diagnostics for one analysis run

use crate::engine::errors::MalformedRecord;
use crate::engine::record::{AggregateKey, ProbeRecord};
use uuid::Uuid;

/// Longest slice of an offending line echoed into a diagnostic
const MAX_ECHOED_LINE: usize = 256;

/// Structured logger tagging every diagnostic with the run id
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
}

impl RunLogger {
    pub fn new(run_id: String) -> Self {
        Self { run_id }
    }

    /// Logger with a fresh random run id
    pub fn fresh() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_malformed_line(&self, line_no: u64, line: &str, reason: &MalformedRecord) {
        tracing::warn!(
            run_id = %self.run_id,
            line_no = line_no,
            reason = %reason,
            line = %truncate(line),
            "Skipping malformed record"
        );
    }

    pub fn log_unclassified(&self, line_no: u64, record: &ProbeRecord) {
        tracing::warn!(
            run_id = %self.run_id,
            line_no = line_no,
            ip = %record.ip,
            domain = %record.domain,
            message = %truncate(&record.raw_message),
            "Non-success outcome not yet categorized"
        );
    }

    pub fn log_under_sampled(&self, key: &AggregateKey, seen: u64, expected: u64) {
        tracing::warn!(
            run_id = %self.run_id,
            key = %key,
            seen = seen,
            expected = expected,
            "Key seen fewer times than expected"
        );
    }

    pub fn log_asn_miss(&self, ip: &str) {
        tracing::debug!(
            run_id = %self.run_id,
            ip = %ip,
            "IP not covered by AS database"
        );
    }

    pub fn log_ingest_finished(&self, lines: u64, observed: u64, malformed: u64, cancelled: bool) {
        tracing::info!(
            run_id = %self.run_id,
            lines = lines,
            observed = observed,
            malformed = malformed,
            cancelled = cancelled,
            "Ingestion finished"
        );
    }
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::fresh()
    }
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_ECHOED_LINE {
        return text;
    }
    let mut end = MAX_ECHOED_LINE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(300);
        let cut = truncate(&long);
        assert!(cut.len() <= MAX_ECHOED_LINE);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(RunLogger::fresh().run_id(), RunLogger::fresh().run_id());
    }
}
