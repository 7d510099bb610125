//! Selection of keys to re-probe

use super::aggregator::{Aggregator, KeyStats};
use super::outcome::Outcome;
use super::record::AggregateKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard retry decision predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPredicate {
    /// Every trial was non-successful, whatever the failure kind
    AllErrored,
    /// Every trial specifically hit an i/o timeout
    AllTimedOut,
}

impl RetryPredicate {
    pub fn matches(self, stats: &KeyStats) -> bool {
        match self {
            Self::AllErrored => stats.seen() > 0 && stats.seen() == stats.error_count(),
            Self::AllTimedOut => stats.all_trials_were(Outcome::IoTimeout),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AllErrored => "all-errored",
            Self::AllTimedOut => "all-timed-out",
        }
    }
}

impl fmt::Display for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keys to re-probe plus the partial-failure tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrySet {
    /// Keys satisfying the predicate, in first-appearance order
    pub keys: Vec<AggregateKey>,
    /// Keys failing the predicate yet with at least one errored trial
    pub weird: u64,
}

impl RetrySet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &AggregateKey) -> bool {
        self.keys.contains(key)
    }
}

/// Is this key neither retried nor cleanly successful?
pub fn is_weird<F>(stats: &KeyStats, predicate: F) -> bool
where
    F: Fn(&KeyStats) -> bool,
{
    !predicate(stats) && stats.error_count() > 0
}

/// Split the aggregate map into retry candidates and a weird count
pub fn select_retries<F>(aggregator: &Aggregator, predicate: F) -> RetrySet
where
    F: Fn(&KeyStats) -> bool,
{
    let mut set = RetrySet::default();
    for (key, stats) in aggregator.iter() {
        if predicate(stats) {
            set.keys.push(key.clone());
        } else if is_weird(stats, &predicate) {
            set.weird += 1;
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::{ProbeRecord, StructuredStatus};

    fn observe(agg: &mut Aggregator, ip: &str, outcomes: &[Outcome]) {
        let record = ProbeRecord::new(ip, "a.com", "", Some(StructuredStatus::Other));
        for outcome in outcomes {
            agg.observe(&record, *outcome);
        }
    }

    fn sample() -> Aggregator {
        let mut agg = Aggregator::new();
        observe(&mut agg, "1.1.1.1", &[Outcome::IoTimeout; 3]);
        observe(&mut agg, "2.2.2.2", &[Outcome::ConnectionRefused, Outcome::Eof]);
        observe(&mut agg, "3.3.3.3", &[Outcome::ConnectionRefused, Outcome::Success]);
        observe(&mut agg, "4.4.4.4", &[Outcome::Success, Outcome::Success]);
        observe(&mut agg, "5.5.5.5", &[Outcome::IoTimeout, Outcome::Success]);
        agg
    }

    fn ips(set: &RetrySet) -> Vec<&str> {
        set.keys.iter().map(|k| k.ip.as_str()).collect()
    }

    #[test]
    fn test_all_errored() {
        let set = select_retries(&sample(), |s| RetryPredicate::AllErrored.matches(s));
        assert_eq!(ips(&set), vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(set.weird, 2);
    }

    #[test]
    fn test_all_timed_out() {
        let set = select_retries(&sample(), |s| RetryPredicate::AllTimedOut.matches(s));
        assert_eq!(ips(&set), vec!["1.1.1.1"]);
        // 2.2.2.2 errored every time but not by timing out
        assert_eq!(set.weird, 3);
    }

    #[test]
    fn test_weird_matches_selection_tally() {
        let agg = sample();
        let predicate = |s: &KeyStats| RetryPredicate::AllErrored.matches(s);
        let weird: Vec<&str> = agg
            .iter()
            .filter(|(_, s)| is_weird(s, predicate))
            .map(|(k, _)| k.ip.as_str())
            .collect();
        assert_eq!(weird, vec!["3.3.3.3", "5.5.5.5"]);
        assert_eq!(select_retries(&agg, predicate).weird, weird.len() as u64);
    }

    #[test]
    fn test_custom_predicate() {
        let set = select_retries(&sample(), |s| s.count(Outcome::ConnectionRefused) > 0);
        assert_eq!(ips(&set), vec!["2.2.2.2", "3.3.3.3"]);
    }

    #[test]
    fn test_predicate_serde_names() {
        let p: RetryPredicate = serde_json::from_str("\"all-timed-out\"").unwrap();
        assert_eq!(p, RetryPredicate::AllTimedOut);
        assert_eq!(RetryPredicate::AllErrored.to_string(), "all-errored");
    }
}
