//! Per-(ip, domain) outcome counters

use super::outcome::Outcome;
use super::record::{AggregateKey, ProbeRecord};
use serde::Serialize;
use std::collections::HashMap;

/// Counters for one aggregate key
///
/// Invariants after any sequence of `record` calls:
/// - `error_count == seen - count(Success)`
/// - `count(o) <= seen` for every outcome
/// - the outcome counts sum to `seen`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    seen: u64,
    error_count: u64,
    outcome_counts: [u64; Outcome::COUNT],
}

impl KeyStats {
    #[inline]
    fn record(&mut self, outcome: Outcome) {
        self.seen += 1;
        self.outcome_counts[outcome.index()] += 1;
        if !outcome.is_success() {
            self.error_count += 1;
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcome_counts[outcome.index()]
    }

    /// Every observed trial landed in `outcome`
    pub fn all_trials_were(&self, outcome: Outcome) -> bool {
        self.seen > 0 && self.seen == self.count(outcome)
    }

    /// Non-zero outcome counts in taxonomy order
    pub fn outcomes(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        Outcome::ALL
            .iter()
            .map(move |o| (*o, self.count(*o)))
            .filter(|(_, n)| *n > 0)
    }
}

/// Key observed fewer times than the configured trial count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnderSampledKey {
    pub key: AggregateKey,
    pub seen: u64,
    pub expected: u64,
}

/// Owns the `AggregateKey -> KeyStats` map for one run
///
/// Iteration yields keys in order of first appearance. No deduplication is
/// performed: observing the same physical trial twice counts it twice.
#[derive(Debug, Default)]
pub struct Aggregator {
    index: HashMap<AggregateKey, usize>,
    entries: Vec<(AggregateKey, KeyStats)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classified record into its key's counters
    pub fn observe(&mut self, record: &ProbeRecord, outcome: Outcome) {
        let key = record.key();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key.clone(), slot);
                self.entries.push((key, KeyStats::default()));
                slot
            }
        };
        self.entries[slot].1.record(outcome);
    }

    pub fn get(&self, key: &AggregateKey) -> Option<&KeyStats> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &KeyStats)> {
        self.entries.iter().map(|(k, s)| (k, s))
    }

    /// Keys seen fewer than `expected` times, in first-appearance order
    pub fn under_sampled(&self, expected: u64) -> Vec<UnderSampledKey> {
        self.iter()
            .filter(|(_, stats)| stats.seen < expected)
            .map(|(key, stats)| UnderSampledKey {
                key: key.clone(),
                seen: stats.seen,
                expected,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::StructuredStatus;

    fn record(ip: &str, domain: &str) -> ProbeRecord {
        ProbeRecord::new(ip, domain, "", Some(StructuredStatus::Success))
    }

    #[test]
    fn test_observe_creates_and_counts() {
        let mut agg = Aggregator::new();
        let r = record("1.2.3.4", "a.com");
        agg.observe(&r, Outcome::IoTimeout);
        agg.observe(&r, Outcome::IoTimeout);
        agg.observe(&r, Outcome::Success);

        let stats = agg.get(&r.key()).unwrap();
        assert_eq!(stats.seen(), 3);
        assert_eq!(stats.count(Outcome::IoTimeout), 2);
        assert_eq!(stats.count(Outcome::Success), 1);
        assert_eq!(stats.error_count(), 2);
        assert!(!stats.all_trials_were(Outcome::IoTimeout));
    }

    #[test]
    fn test_first_appearance_order() {
        let mut agg = Aggregator::new();
        agg.observe(&record("9.9.9.9", "z.com"), Outcome::Success);
        agg.observe(&record("1.1.1.1", "a.com"), Outcome::Success);
        agg.observe(&record("9.9.9.9", "z.com"), Outcome::Eof);

        let keys: Vec<String> = agg.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["9.9.9.9-z.com", "1.1.1.1-a.com"]);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn test_duplicate_observation_double_counts() {
        let mut agg = Aggregator::new();
        let r = record("1.2.3.4", "a.com");
        agg.observe(&r, Outcome::ConnectionRefused);
        agg.observe(&r, Outcome::ConnectionRefused);
        assert_eq!(agg.get(&r.key()).unwrap().seen(), 2);
    }

    #[test]
    fn test_under_sampled() {
        let mut agg = Aggregator::new();
        let a = record("1.1.1.1", "a.com");
        let b = record("2.2.2.2", "b.com");
        for _ in 0..3 {
            agg.observe(&a, Outcome::Success);
        }
        agg.observe(&b, Outcome::Success);

        let short = agg.under_sampled(3);
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].key, b.key());
        assert_eq!(short[0].seen, 1);
    }
}
