//! Prometheus counters for ingestion and enrichment

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Run-wide metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub lines_read: IntCounter,
    pub records_observed: IntCounter,
    pub records_malformed: IntCounter,
    pub outcomes_unclassified: IntCounter,
    pub outcomes: IntCounterVec,
    pub asn_lookup_misses: IntCounter,

    // Histograms
    pub ingest_duration: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let lines_read = IntCounter::with_opts(Opts::new(
            "probestat_lines_read_total",
            "Input lines read",
        ))?;

        let records_observed = IntCounter::with_opts(Opts::new(
            "probestat_records_observed_total",
            "Records folded into the aggregator",
        ))?;

        let records_malformed = IntCounter::with_opts(Opts::new(
            "probestat_records_malformed_total",
            "Input lines skipped as malformed",
        ))?;

        let outcomes_unclassified = IntCounter::with_opts(Opts::new(
            "probestat_outcomes_unclassified_total",
            "Non-success records no rule recognized",
        ))?;

        let outcomes = IntCounterVec::new(
            Opts::new("probestat_outcomes_total", "Classified records by outcome"),
            &["outcome"],
        )?;

        let asn_lookup_misses = IntCounter::with_opts(Opts::new(
            "probestat_asn_lookup_misses_total",
            "Distinct IPs not covered by the AS database",
        ))?;

        let ingest_duration = Histogram::with_opts(
            HistogramOpts::new("probestat_ingest_duration_seconds", "Ingestion wall time")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )?;

        registry.register(Box::new(lines_read.clone()))?;
        registry.register(Box::new(records_observed.clone()))?;
        registry.register(Box::new(records_malformed.clone()))?;
        registry.register(Box::new(outcomes_unclassified.clone()))?;
        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(asn_lookup_misses.clone()))?;
        registry.register(Box::new(ingest_duration.clone()))?;

        Ok(Self {
            registry,
            lines_read,
            records_observed,
            records_malformed,
            outcomes_unclassified,
            outcomes,
            asn_lookup_misses,
            ingest_duration,
        })
    }

    /// Render every registered metric in Prometheus text format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe_duration(self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_registry_encodes() {
        let m = Metrics::new().unwrap();
        m.lines_read.inc_by(3);
        m.outcomes.with_label_values(&["io_timeout"]).inc();
        let text = m.encode_text().unwrap();
        assert!(text.contains("probestat_lines_read_total 3"));
        assert!(text.contains("outcome=\"io_timeout\""));
    }
}
