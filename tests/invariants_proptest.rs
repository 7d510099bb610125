//! Property tests for aggregation and retry selection

use probestat::engine::{select_retries, Aggregator, Outcome, ProbeRecord, RetryPredicate};
use proptest::prelude::*;

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    (0..Outcome::COUNT).prop_map(|i| Outcome::ALL[i])
}

fn observations() -> impl Strategy<Value = Vec<(u8, u8, Outcome)>> {
    prop::collection::vec((0u8..4, 0u8..3, outcome_strategy()), 0..200)
}

fn build(obs: &[(u8, u8, Outcome)]) -> Aggregator {
    let mut aggregator = Aggregator::new();
    for (ip, domain, outcome) in obs {
        let record = ProbeRecord::new(
            format!("10.0.0.{}", ip),
            format!("d{}.example", domain),
            String::new(),
            None,
        );
        aggregator.observe(&record, *outcome);
    }
    aggregator
}

proptest! {
    #[test]
    fn counters_always_balance(obs in observations()) {
        let aggregator = build(&obs);

        let mut total_seen = 0;
        for (_, stats) in aggregator.iter() {
            prop_assert_eq!(stats.count(Outcome::Success) + stats.error_count(), stats.seen());
            let sum: u64 = stats.outcomes().map(|(_, n)| n).sum();
            prop_assert_eq!(sum, stats.seen());
            prop_assert!(stats.seen() > 0);
            total_seen += stats.seen();
        }
        prop_assert_eq!(total_seen, obs.len() as u64);
    }

    #[test]
    fn retries_and_weird_partition_failing_keys(obs in observations()) {
        let aggregator = build(&obs);

        for predicate in [RetryPredicate::AllErrored, RetryPredicate::AllTimedOut] {
            let retries = select_retries(&aggregator, |s| predicate.matches(s));
            let errored_keys = aggregator
                .iter()
                .filter(|(_, s)| s.error_count() > 0)
                .count();
            prop_assert_eq!(retries.len() + retries.weird as usize, errored_keys);

            // Selection preserves first-appearance order
            let order: Vec<_> = aggregator
                .iter()
                .filter(|(k, _)| retries.contains(k))
                .map(|(k, _)| k.clone())
                .collect();
            prop_assert_eq!(&order, &retries.keys);
        }
    }
}

#[test]
fn duplicate_observations_count_twice() {
    let record = ProbeRecord::new("1.2.3.4", "a.com", "connect: connection refused", None);
    let mut aggregator = Aggregator::new();
    aggregator.observe(&record, Outcome::ConnectionRefused);
    aggregator.observe(&record, Outcome::ConnectionRefused);

    let stats = aggregator.get(&record.key()).unwrap();
    assert_eq!(stats.seen(), 2);
    assert_eq!(stats.error_count(), 2);
    assert_eq!(aggregator.len(), 1);
}
