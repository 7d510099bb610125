//! Closed taxonomy of classifiable probe outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record lengths recognized in "oversized record received" TLS errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OversizedLength {
    /// `oversized record received with length 20527`
    L20527,
    /// `oversized record received with length 29805`
    L29805,
}

impl OversizedLength {
    /// Map a parsed record length onto a recognized variant
    pub fn from_len(len: u32) -> Option<Self> {
        match len {
            20527 => Some(Self::L20527),
            29805 => Some(Self::L29805),
            _ => None,
        }
    }
}

/// Classified result of one probe trial
///
/// Variants are declared in classification priority order; the classifier
/// tests them first-match-wins in exactly this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    ConnectionRefused,
    ConnectionReset,
    IoTimeout,
    NetworkUnreachable,
    RemoteInternalError,
    NoRouteToHost,
    UnexpectedEof,
    ContextDeadlineExceeded,
    OversizedRecord(OversizedLength),
    Eof,
    RemoteHandshakeFailure,
    Alert112,
    PermissionDenied,
    /// Non-successful trial that no pattern recognized
    Unclassified,
    Success,
}

impl Outcome {
    /// Number of distinct outcomes (oversized lengths counted separately)
    pub const COUNT: usize = 16;

    /// Every outcome, in priority order
    pub const ALL: [Outcome; Outcome::COUNT] = [
        Outcome::ConnectionRefused,
        Outcome::ConnectionReset,
        Outcome::IoTimeout,
        Outcome::NetworkUnreachable,
        Outcome::RemoteInternalError,
        Outcome::NoRouteToHost,
        Outcome::UnexpectedEof,
        Outcome::ContextDeadlineExceeded,
        Outcome::OversizedRecord(OversizedLength::L20527),
        Outcome::OversizedRecord(OversizedLength::L29805),
        Outcome::Eof,
        Outcome::RemoteHandshakeFailure,
        Outcome::Alert112,
        Outcome::PermissionDenied,
        Outcome::Unclassified,
        Outcome::Success,
    ];

    /// Dense slot used by per-key counter arrays
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::ConnectionRefused => 0,
            Self::ConnectionReset => 1,
            Self::IoTimeout => 2,
            Self::NetworkUnreachable => 3,
            Self::RemoteInternalError => 4,
            Self::NoRouteToHost => 5,
            Self::UnexpectedEof => 6,
            Self::ContextDeadlineExceeded => 7,
            Self::OversizedRecord(OversizedLength::L20527) => 8,
            Self::OversizedRecord(OversizedLength::L29805) => 9,
            Self::Eof => 10,
            Self::RemoteHandshakeFailure => 11,
            Self::Alert112 => 12,
            Self::PermissionDenied => 13,
            Self::Unclassified => 14,
            Self::Success => 15,
        }
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Stable snake_case name, used for metric labels
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectionReset => "connection_reset",
            Self::IoTimeout => "io_timeout",
            Self::NetworkUnreachable => "network_unreachable",
            Self::RemoteInternalError => "remote_error_internal_error",
            Self::NoRouteToHost => "no_route_to_host",
            Self::UnexpectedEof => "unexpected_eof",
            Self::ContextDeadlineExceeded => "context_deadline_exceeded",
            Self::OversizedRecord(OversizedLength::L20527) => "oversized_20527",
            Self::OversizedRecord(OversizedLength::L29805) => "oversized_29805",
            Self::Eof => "eof",
            Self::RemoteHandshakeFailure => "remote_error_handshake_failure",
            Self::Alert112 => "alert_112",
            Self::PermissionDenied => "permission_denied",
            Self::Unclassified => "unclassified",
            Self::Success => "success",
        }
    }

    /// Human-readable label for report lines
    pub const fn label(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection refused",
            Self::ConnectionReset => "connection reset",
            Self::IoTimeout => "i/o timeout",
            Self::NetworkUnreachable => "network unreachable",
            Self::RemoteInternalError => "remote error: internal error",
            Self::NoRouteToHost => "no route to host",
            Self::UnexpectedEof => "unexpected EOF",
            Self::ContextDeadlineExceeded => "context deadline exceeded",
            Self::OversizedRecord(OversizedLength::L20527) => "oversized 20527",
            Self::OversizedRecord(OversizedLength::L29805) => "oversized 29805",
            Self::Eof => "EOF",
            Self::RemoteHandshakeFailure => "remote error: handshake failure",
            Self::Alert112 => "alert 112",
            Self::PermissionDenied => "permission denied",
            Self::Unclassified => "unclassified",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
