//! probestat - classification and aggregation of repeated censorship probes
//!
//! Reads newline-delimited probe logs, classifies every trial into a fixed
//! taxonomy of network/TLS failures, aggregates outcomes per (IP, domain),
//! selects keys for re-probing and rolls results up per autonomous system.

pub mod config;
pub mod engine;
pub mod metrics;
pub mod structured_logging;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{
    classify, Aggregator, Analysis, AnalysisOutcome, KeyStats, Outcome, ProbeRecord,
    ProbeStatError, ReportDocument, RetryPredicate, RetrySet,
};
