//! Probe records and per-line parsing
//!
//! Two line shapes are accepted:
//! - flat: `{"ip", "domain", "timestamp"?, "raw" | "error"?, "status"?}`
//! - zgrab2: `{"ip", "domain", "data": {"<module>": {"status", "error"?, "timestamp"?}}}`
//!
//! For zgrab2 lines the `tls` module wins, otherwise the first module by name.

use super::errors::MalformedRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Module preferred when a zgrab2 line carries several
const PREFERRED_MODULE: &str = "tls";

/// Status reported by the prober alongside the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredStatus {
    Success,
    Other,
}

impl StructuredStatus {
    fn from_wire(status: &str) -> Self {
        if status == "success" {
            Self::Success
        } else {
            Self::Other
        }
    }
}

/// One probe trial as read from the input stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub ip: String,
    pub domain: String,
    /// Opaque; carried for diagnostics only
    pub timestamp: Option<String>,
    pub raw_message: String,
    pub structured_status: Option<StructuredStatus>,
}

impl ProbeRecord {
    pub fn new(
        ip: impl Into<String>,
        domain: impl Into<String>,
        raw_message: impl Into<String>,
        structured_status: Option<StructuredStatus>,
    ) -> Self {
        Self {
            ip: ip.into(),
            domain: domain.into(),
            timestamp: None,
            raw_message: raw_message.into(),
            structured_status,
        }
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.ip.clone(), self.domain.clone())
    }

    /// Parse one input line
    pub fn parse_line(line: &str) -> Result<Self, MalformedRecord> {
        let wire: WireRecord = serde_json::from_str(line)
            .map_err(|e| MalformedRecord::InvalidJson(e.to_string()))?;

        if wire.ip.is_empty() || wire.domain.is_empty() {
            return Err(MalformedRecord::EmptyKey);
        }

        let module = wire.data.as_ref().and_then(select_module);

        let raw_message = wire
            .raw
            .or(wire.error)
            .or_else(|| module.and_then(|m| string_field(m, "error")))
            .unwrap_or_default();

        let structured_status = wire
            .status
            .or_else(|| module.and_then(|m| string_field(m, "status")))
            .map(|s| StructuredStatus::from_wire(&s));

        let timestamp = wire
            .timestamp
            .or_else(|| module.and_then(|m| m.get("timestamp").cloned()))
            .map(opaque_to_string);

        Ok(Self {
            ip: wire.ip,
            domain: wire.domain,
            timestamp,
            raw_message,
            structured_status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    ip: String,
    domain: String,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

fn select_module(data: &Map<String, Value>) -> Option<&Map<String, Value>> {
    data.get(PREFERRED_MODULE)
        .or_else(|| data.values().next())
        .and_then(Value::as_object)
}

fn string_field(module: &Map<String, Value>, field: &str) -> Option<String> {
    module.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn opaque_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Identity of one (ip, domain) pair for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    pub ip: String,
    pub domain: String,
}

impl AggregateKey {
    pub fn new(ip: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ip, self.domain)
    }
}
