//! Ordered first-match classifier for probe outcomes
//!
//! Rules run in taxonomy priority order. Specific markers come before broad
//! ones: bare `EOF` is a substring of `unexpected EOF` and of many TLS
//! errors, so it is only tested after both of those rules have missed.

use super::outcome::{OversizedLength, Outcome};
use super::record::{ProbeRecord, StructuredStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static OVERSIZED_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"oversized record received with length (\d+)")
        .expect("oversized record pattern is valid")
});

#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// Plain substring test
    Literal(&'static str),
    /// `oversized record received with length N` for a recognized N
    Oversized,
}

/// Classification rules in priority order
const RULES: &[(Matcher, Option<Outcome>)] = &[
    (Matcher::Literal("connection refused"), Some(Outcome::ConnectionRefused)),
    (Matcher::Literal("connection reset by peer"), Some(Outcome::ConnectionReset)),
    (Matcher::Literal("i/o timeout"), Some(Outcome::IoTimeout)),
    (Matcher::Literal("network is unreachable"), Some(Outcome::NetworkUnreachable)),
    (Matcher::Literal("remote error: internal error"), Some(Outcome::RemoteInternalError)),
    (Matcher::Literal("no route to host"), Some(Outcome::NoRouteToHost)),
    (Matcher::Literal("unexpected EOF"), Some(Outcome::UnexpectedEof)),
    (Matcher::Literal("context deadline exceeded"), Some(Outcome::ContextDeadlineExceeded)),
    // Outcome depends on the captured length
    (Matcher::Oversized, None),
    (Matcher::Literal("EOF"), Some(Outcome::Eof)),
    (Matcher::Literal("remote error: handshake failure"), Some(Outcome::RemoteHandshakeFailure)),
    (Matcher::Literal("alert(112)"), Some(Outcome::Alert112)),
    (Matcher::Literal("connect: permission denied"), Some(Outcome::PermissionDenied)),
];

fn oversized_length(message: &str) -> Option<OversizedLength> {
    OVERSIZED_RECORD
        .captures_iter(message)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find_map(OversizedLength::from_len)
}

/// Match the message against the failure rules only
#[inline]
pub fn match_failure(message: &str) -> Option<Outcome> {
    if message.is_empty() {
        return None;
    }

    RULES.iter().find_map(|(matcher, outcome)| match matcher {
        Matcher::Literal(needle) => message.contains(needle).then_some(*outcome).flatten(),
        Matcher::Oversized => oversized_length(message).map(Outcome::OversizedRecord),
    })
}

/// Assign exactly one outcome to a record
///
/// Pure: the caller decides how to surface `Unclassified` results.
/// With no matching rule, a record is `Success` when its status says so, or
/// when it carries neither a status nor any error text.
pub fn classify(record: &ProbeRecord) -> Outcome {
    if let Some(outcome) = match_failure(&record.raw_message) {
        return outcome;
    }

    match record.structured_status {
        Some(StructuredStatus::Success) => Outcome::Success,
        Some(StructuredStatus::Other) => Outcome::Unclassified,
        None if record.raw_message.trim().is_empty() => Outcome::Success,
        None => Outcome::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(message: &str) -> ProbeRecord {
        ProbeRecord::new("1.2.3.4", "a.com", message, Some(StructuredStatus::Other))
    }

    #[test]
    fn test_each_literal_rule() {
        let cases = [
            ("dial tcp 1.2.3.4:443: connect: connection refused", Outcome::ConnectionRefused),
            ("read tcp: connection reset by peer", Outcome::ConnectionReset),
            ("dial tcp 1.2.3.4:443: i/o timeout", Outcome::IoTimeout),
            ("connect: network is unreachable", Outcome::NetworkUnreachable),
            ("remote error: tls: internal error", Outcome::Unclassified),
            ("remote error: internal error", Outcome::RemoteInternalError),
            ("connect: no route to host", Outcome::NoRouteToHost),
            ("unexpected EOF", Outcome::UnexpectedEof),
            ("context deadline exceeded", Outcome::ContextDeadlineExceeded),
            ("EOF", Outcome::Eof),
            ("remote error: handshake failure", Outcome::RemoteHandshakeFailure),
            ("local error: tls: alert(112)", Outcome::Alert112),
            ("dial tcp: connect: permission denied", Outcome::PermissionDenied),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&failed(message)), expected, "{}", message);
        }
    }

    #[test]
    fn test_oversized_beats_bare_eof() {
        let record = failed("tls: oversized record received with length 20527; EOF");
        assert_eq!(
            classify(&record),
            Outcome::OversizedRecord(OversizedLength::L20527)
        );

        let record = failed("tls: oversized record received with length 29805");
        assert_eq!(
            classify(&record),
            Outcome::OversizedRecord(OversizedLength::L29805)
        );
    }

    #[test]
    fn test_unknown_oversized_length_falls_through() {
        let record = failed("tls: oversized record received with length 16706");
        assert_eq!(classify(&record), Outcome::Unclassified);

        let record = ProbeRecord::new(
            "1.2.3.4",
            "a.com",
            "tls: oversized record received with length 16706",
            Some(StructuredStatus::Success),
        );
        assert_eq!(classify(&record), Outcome::Success);

        let record = failed("oversized record received with length 16706 then EOF");
        assert_eq!(classify(&record), Outcome::Eof);
    }

    #[test]
    fn test_higher_priority_wins() {
        let record = failed("i/o timeout after connection refused");
        assert_eq!(classify(&record), Outcome::ConnectionRefused);

        let record = failed("unexpected EOF");
        assert_eq!(classify(&record), Outcome::UnexpectedEof);
    }

    #[test]
    fn test_success_fallbacks() {
        let ok = ProbeRecord::new("1.2.3.4", "a.com", "", Some(StructuredStatus::Success));
        assert_eq!(classify(&ok), Outcome::Success);

        let bare = ProbeRecord::new("1.2.3.4", "a.com", "", None);
        assert_eq!(classify(&bare), Outcome::Success);

        let odd = ProbeRecord::new("1.2.3.4", "a.com", "tls: bad certificate", None);
        assert_eq!(classify(&odd), Outcome::Unclassified);

        assert_eq!(classify(&failed("")), Outcome::Unclassified);
    }

    #[test]
    fn test_pattern_overrides_success_status() {
        let record = ProbeRecord::new(
            "1.2.3.4",
            "a.com",
            "read: connection reset by peer",
            Some(StructuredStatus::Success),
        );
        assert_eq!(classify(&record), Outcome::ConnectionReset);
    }
}
