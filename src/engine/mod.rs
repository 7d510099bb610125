// Engine components
pub mod outcome;              // Outcome taxonomy, priority order, labels
pub mod record;               // ProbeRecord, AggregateKey, line parsing (flat + zgrab2)
pub mod classifier;           // Ordered first-match rules -> Outcome
pub mod aggregator;           // KeyStats per (ip, domain), first-appearance order
pub mod ingest;               // batched reader, scoped classify workers, single aggregator writer
pub mod asn;                  // AsnLookup backends (mmdb, CIDR table) + memoizing enricher
pub mod retry;                // RetryPredicate, select_retries, weird tally
pub mod report;               // ReportDocument + console / AS summary / retry file text
pub mod output;               // outputs staged up front, fsynced, renamed together
pub mod errors;               // ProbeStatError, MalformedRecord
pub mod analysis;             // end-to-end run wiring

// Re-export commonly used types
pub use aggregator::{Aggregator, KeyStats, UnderSampledKey};
pub use analysis::{Analysis, AnalysisOutcome};
pub use asn::{AsEnricher, AsIdentifier, AsRecord, AsnLookup, CidrTable, MmdbAsnDatabase};
pub use classifier::classify;
pub use errors::{MalformedRecord, ProbeStatError, Result};
pub use ingest::{IngestOptions, IngestStats, Ingestion, Ingestor};
pub use outcome::{OversizedLength, Outcome};
pub use record::{AggregateKey, ProbeRecord, StructuredStatus};
pub use report::{AsBucket, RateLine, ReportDocument};
pub use retry::{select_retries, RetryPredicate, RetrySet};
