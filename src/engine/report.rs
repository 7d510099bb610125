//! Rates, AS rollups and their text renderings

use super::aggregator::Aggregator;
use super::asn::AsEnricher;
use super::ingest::IngestStats;
use super::outcome::Outcome;
use super::retry::{RetryPredicate, RetrySet};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

/// `count / total` with the derived rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLine {
    pub label: String,
    pub count: u64,
    pub total: u64,
    pub rate: f64,
}

impl RateLine {
    fn new(label: impl Into<String>, count: u64, total: u64) -> Self {
        let rate = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        };
        Self {
            label: label.into(),
            count,
            total,
            rate,
        }
    }
}

/// Per-AS rollup of keys under the active retry predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsBucket {
    pub as_id: String,
    pub failing_count: u64,
    pub fine_count: u64,
}

/// Everything a presentation layer needs to render one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub run_id: String,
    pub predicate: RetryPredicate,
    pub total_keys: u64,
    pub ingest: IngestStats,
    pub under_sampled_keys: u64,
    /// One line per outcome: keys whose every trial landed in that outcome
    pub categories: Vec<RateLine>,
    pub weird: RateLine,
    pub retry: RateLine,
    pub as_buckets: Vec<AsBucket>,
    pub unknown_asn_ips: Vec<String>,
}

/// Inputs consumed by `render`
pub struct ReportInputs<'a> {
    pub run_id: &'a str,
    pub aggregator: &'a Aggregator,
    pub ingest: &'a IngestStats,
    pub under_sampled_keys: u64,
    pub predicate: RetryPredicate,
    pub retries: &'a RetrySet,
}

/// Build the report document, resolving each key's IP through `enricher`
pub fn render(inputs: ReportInputs<'_>, enricher: &AsEnricher) -> ReportDocument {
    let aggregator = inputs.aggregator;
    let total = aggregator.len() as u64;

    let categories = Outcome::ALL
        .iter()
        .map(|outcome| {
            let count = aggregator
                .iter()
                .filter(|(_, stats)| stats.all_trials_were(*outcome))
                .count() as u64;
            RateLine::new(format!("ip-domain {} rate", outcome.label()), count, total)
        })
        .collect();

    let mut as_buckets: Vec<AsBucket> = Vec::new();
    let mut bucket_slots: HashMap<String, usize> = HashMap::new();
    for (key, stats) in aggregator.iter() {
        let as_id = enricher.resolve(&key.ip).to_string();
        let slot = *bucket_slots.entry(as_id.clone()).or_insert_with(|| {
            as_buckets.push(AsBucket {
                as_id,
                failing_count: 0,
                fine_count: 0,
            });
            as_buckets.len() - 1
        });
        if inputs.predicate.matches(stats) {
            as_buckets[slot].failing_count += 1;
        } else {
            as_buckets[slot].fine_count += 1;
        }
    }

    ReportDocument {
        run_id: inputs.run_id.to_string(),
        predicate: inputs.predicate,
        total_keys: total,
        ingest: inputs.ingest.clone(),
        under_sampled_keys: inputs.under_sampled_keys,
        categories,
        weird: RateLine::new("weird rate", inputs.retries.weird, total),
        retry: RateLine::new(
            format!("ip-domain {} rate", inputs.predicate),
            inputs.retries.len() as u64,
            total,
        ),
        as_buckets,
        unknown_asn_ips: enricher.unknown_ips(),
    }
}

impl ReportDocument {
    /// Human-readable console summary
    pub fn to_console_text(&self) -> String {
        let mut out = String::new();
        let i = &self.ingest;
        let _ = writeln!(
            out,
            "lines read: {} (observed {}, malformed {}, blank {}, unclassified {}){}",
            i.lines_read,
            i.observed,
            i.malformed,
            i.blank_lines,
            i.unclassified,
            if i.cancelled { " [cancelled]" } else { "" }
        );
        let _ = writeln!(
            out,
            "keys: {} ({} under expected trial count)",
            self.total_keys, self.under_sampled_keys
        );
        for line in &self.categories {
            write_rate(&mut out, line);
        }
        write_rate(&mut out, &self.retry);
        write_rate(&mut out, &self.weird);
        out
    }

    /// `asn_identifier: failing fine` per bucket, then `unknown_asn: <ip>` lines
    pub fn to_as_summary_text(&self) -> String {
        let mut out = String::new();
        for bucket in &self.as_buckets {
            let _ = writeln!(
                out,
                "{}: {} {}",
                bucket.as_id, bucket.failing_count, bucket.fine_count
            );
        }
        for ip in &self.unknown_asn_ips {
            let _ = writeln!(out, "unknown_asn: {}", ip);
        }
        out
    }
}

fn write_rate(out: &mut String, line: &RateLine) {
    let _ = writeln!(
        out,
        "{}: {} / {} = {}",
        line.label, line.count, line.total, line.rate
    );
}

/// `ip, domain` per retried key
pub fn retry_file_text(retries: &RetrySet) -> String {
    let mut out = String::new();
    for key in &retries.keys {
        let _ = writeln!(out, "{}, {}", key.ip, key.domain);
    }
    out
}
