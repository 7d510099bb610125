//! IP-to-AS attribution
//!
//! The database is loaded once per run and never mutated. Misses are not
//! errors: they resolve to `AsIdentifier::Unknown` and each missing IP is
//! remembered once so the reporter can list coverage gaps.

use super::errors::{ProbeStatError, Result};
use crate::metrics::metrics;
use crate::structured_logging::RunLogger;
use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Sentinel identifier for IPs outside database coverage
pub const UNKNOWN_ASN: &str = "UnknownASN";

/// Raw database hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsRecord {
    pub number: u32,
    pub organization: String,
}

/// Resolved AS attribution for one IP
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AsIdentifier {
    Known { number: u32, organization: String },
    Unknown,
}

impl AsIdentifier {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<AsRecord> for AsIdentifier {
    fn from(record: AsRecord) -> Self {
        Self::Known {
            number: record.number,
            organization: record.organization,
        }
    }
}

impl fmt::Display for AsIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known {
                number,
                organization,
            } => write!(f, "{}-{}", number, organization),
            Self::Unknown => f.write_str(UNKNOWN_ASN),
        }
    }
}

/// Read-only IP-to-AS database
pub trait AsnLookup: Send + Sync {
    /// `None` when the address is not covered
    fn lookup(&self, ip: IpAddr) -> Option<AsRecord>;
}

/// MaxMind GeoLite2-ASN database
pub struct MmdbAsnDatabase {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MmdbAsnDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let reader =
            maxminddb::Reader::open_readfile(path).map_err(|e| ProbeStatError::AsnDatabase {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self { reader })
    }
}

impl AsnLookup for MmdbAsnDatabase {
    fn lookup(&self, ip: IpAddr) -> Option<AsRecord> {
        match self.reader.lookup::<maxminddb::geoip2::Asn>(ip) {
            Ok(asn) => Some(AsRecord {
                number: asn.autonomous_system_number?,
                organization: asn
                    .autonomous_system_organization
                    .unwrap_or_default()
                    .to_string(),
            }),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => None,
            Err(e) => {
                warn!(ip = %ip, error = %e, "AS database lookup failed");
                None
            }
        }
    }
}

/// Plain-text CIDR table, longest prefix wins
///
/// One entry per line: `<cidr>\t<asn>\t<organization>`. Blank lines and
/// lines starting with `#` are ignored. The `AS` prefix on the number is optional.
#[derive(Debug, Clone, Default)]
pub struct CidrTable {
    entries: Vec<(IpNetwork, AsRecord)>,
}

impl CidrTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, network: IpNetwork, record: AsRecord) {
        self.entries.push((network, record));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProbeStatError::io(path, e))?;
        Self::parse(&text).map_err(|message| ProbeStatError::AsnDatabase {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut table = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, '\t');
            let (Some(cidr), Some(asn)) = (fields.next(), fields.next()) else {
                return Err(format!("line {}: expected <cidr>\\t<asn>\\t<organization>", idx + 1));
            };
            let organization = fields.next().unwrap_or_default().trim().to_string();

            let network = IpNetwork::from_str(cidr.trim())
                .map_err(|e| format!("line {}: bad network {:?}: {}", idx + 1, cidr, e))?;
            let asn = asn.trim();
            let number = asn
                .strip_prefix("AS")
                .unwrap_or(asn)
                .parse::<u32>()
                .map_err(|e| format!("line {}: bad AS number {:?}: {}", idx + 1, asn, e))?;

            table.insert(
                network,
                AsRecord {
                    number,
                    organization,
                },
            );
        }
        Ok(table)
    }
}

impl AsnLookup for CidrTable {
    fn lookup(&self, ip: IpAddr) -> Option<AsRecord> {
        self.entries
            .iter()
            .filter(|(network, _)| network.contains(ip))
            .max_by_key(|(network, _)| network.prefix())
            .map(|(_, record)| record.clone())
    }
}

/// Load the AS database, picking the backend from the file extension
pub fn open_asn_database(path: &Path) -> Result<Box<dyn AsnLookup>> {
    let is_mmdb = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mmdb"));

    if is_mmdb {
        info!(path = %path.display(), "Loading MaxMind AS database");
        Ok(Box::new(MmdbAsnDatabase::open(path)?))
    } else {
        let table = CidrTable::from_path(path)?;
        info!(path = %path.display(), entries = table.len(), "Loaded CIDR AS table");
        Ok(Box::new(table))
    }
}

/// Memoizing resolver over an `AsnLookup`
///
/// Safe to call repeatedly for the same IP; each unresolved IP is recorded
/// once, in first-seen order.
pub struct AsEnricher {
    lookup: Box<dyn AsnLookup>,
    logger: RunLogger,
    cache: Mutex<HashMap<String, AsIdentifier>>,
    unknown_ips: Mutex<Vec<String>>,
}

impl AsEnricher {
    pub fn new(lookup: Box<dyn AsnLookup>, logger: RunLogger) -> Self {
        Self {
            lookup,
            logger,
            cache: Mutex::new(HashMap::new()),
            unknown_ips: Mutex::new(Vec::new()),
        }
    }

    pub fn resolve(&self, ip: &str) -> AsIdentifier {
        if let Some(hit) = self.cache.lock().get(ip) {
            return hit.clone();
        }

        let resolved = match ip.parse::<IpAddr>() {
            Ok(addr) => self.lookup.lookup(addr).map(AsIdentifier::from),
            Err(_) => {
                warn!(ip = %ip, "Not an IP address, treating as unknown AS");
                None
            }
        }
        .unwrap_or(AsIdentifier::Unknown);

        // Another caller may have resolved the same IP meanwhile; only the
        // first insert records the miss.
        let mut cache = self.cache.lock();
        if !cache.contains_key(ip) {
            if resolved.is_unknown() {
                self.logger.log_asn_miss(ip);
                metrics().asn_lookup_misses.inc();
                self.unknown_ips.lock().push(ip.to_string());
            }
            cache.insert(ip.to_string(), resolved.clone());
        }
        resolved
    }

    /// IPs that resolved to `UnknownASN`, each once
    pub fn unknown_ips(&self) -> Vec<String> {
        self.unknown_ips.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CidrTable {
        CidrTable::parse(
            "# test table\n\
             10.0.0.0/8\tAS64500\tExample Backbone\n\
             10.1.0.0/16\t64501\tExample Regional\n\
             2001:db8::/32\t64502\tExample V6\n",
        )
        .unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let t = table();
        assert_eq!(t.len(), 3);
        let hit = t.lookup("10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(hit.number, 64501);
        let hit = t.lookup("10.9.2.3".parse().unwrap()).unwrap();
        assert_eq!(hit.organization, "Example Backbone");
        assert!(t.lookup("192.0.2.1".parse().unwrap()).is_none());
        assert_eq!(t.lookup("2001:db8::1".parse().unwrap()).unwrap().number, 64502);
    }

    #[test]
    fn test_parse_errors() {
        assert!(CidrTable::parse("10.0.0.0/8\n").is_err());
        assert!(CidrTable::parse("not-a-net\t1\tx\n").is_err());
        assert!(CidrTable::parse("10.0.0.0/8\tASx\tx\n").is_err());
    }

    #[test]
    fn test_identifier_display() {
        let known = AsIdentifier::Known {
            number: 13335,
            organization: "CLOUDFLARENET".into(),
        };
        assert_eq!(known.to_string(), "13335-CLOUDFLARENET");
        assert_eq!(AsIdentifier::Unknown.to_string(), "UnknownASN");
    }

    #[test]
    fn test_enricher_records_each_miss_once() {
        let enricher = AsEnricher::new(Box::new(table()), RunLogger::fresh());
        assert!(enricher.resolve("192.0.2.1").is_unknown());
        assert!(enricher.resolve("192.0.2.1").is_unknown());
        assert!(enricher.resolve("garbage").is_unknown());
        assert!(!enricher.resolve("10.0.0.1").is_unknown());
        assert_eq!(enricher.unknown_ips(), vec!["192.0.2.1", "garbage"]);
    }
}
