//! Client list decoding
//!
//! The operator's device registry is a single string of `;`-separated
//! entries, each `mac,hostname,address`:
//!
//! ```text
//! 00:11:22:33:44:55,alpha,192.168.1.10;00:11:22:33:44:56,beta,192.168.1.11
//! ```
//!
//! Decoding is lenient. An entry that is incomplete or carries a blank
//! hostname or an unparsable address is skipped, never reported as an error.

use std::fmt;
use std::net::IpAddr;

use tracing::debug;

const ENTRY_SEPARATOR: char = ';';
const FIELD_SEPARATOR: char = ',';

/// A hostname and the address it should resolve to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRecord {
    pub hostname: String,
    pub address: IpAddr,
}

impl HostRecord {
    pub fn new(hostname: impl Into<String>, address: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            address,
        }
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.hostname, self.address)
    }
}

/// One decoded client list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientListEntry {
    /// Hardware address as written by the operator, if any
    pub mac: Option<String>,
    pub record: HostRecord,
}

/// Decode every well-formed entry, in encounter order.
///
/// Duplicate hostnames are kept; the config model resolves them.
pub fn parse_entries(raw: &str) -> Vec<ClientListEntry> {
    raw.split(ENTRY_SEPARATOR)
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let parsed = parse_entry(entry);
            if parsed.is_none() {
                debug!("Dropping malformed client list entry {:?}", entry);
            }
            parsed
        })
        .collect()
}

/// Decode the client list into host records, in encounter order.
pub fn parse_client_list(raw: &str) -> Vec<HostRecord> {
    parse_entries(raw).into_iter().map(|e| e.record).collect()
}

fn parse_entry(entry: &str) -> Option<ClientListEntry> {
    let mut fields = entry.split(FIELD_SEPARATOR).map(str::trim);

    let mac = fields.next()?;
    let hostname = fields.next()?;
    let address = fields.next()?;

    if hostname.is_empty() || hostname.contains(char::is_whitespace) {
        return None;
    }
    let address: IpAddr = address.parse().ok()?;

    Some(ClientListEntry {
        mac: (!mac.is_empty()).then(|| mac.to_string()),
        record: HostRecord::new(hostname, address),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_drops_malformed_middle_entry() {
        let records = parse_client_list(
            "00:11:22:33:44:55,alpha,192.168.1.10;INVALID;  ,beta,192.168.1.11",
        );
        assert_eq!(
            records,
            vec![
                HostRecord::new("alpha", ip("192.168.1.10")),
                HostRecord::new("beta", ip("192.168.1.11")),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_client_list("").is_empty());
        assert!(parse_client_list("   ").is_empty());
        assert!(parse_client_list(";;").is_empty());
    }

    #[test]
    fn test_rejects_bad_fields() {
        // blank hostname
        assert!(parse_client_list("aa,,10.0.0.1").is_empty());
        // unparsable address
        assert!(parse_client_list("aa,host,10.0.0.300").is_empty());
        // missing address
        assert!(parse_client_list("aa,host").is_empty());
        // whitespace inside the hostname
        assert!(parse_client_list("aa,my host,10.0.0.1").is_empty());
    }

    #[test]
    fn test_keeps_duplicates_in_order() {
        let records = parse_client_list("m1,a,10.0.0.1;m2,a,10.0.0.2");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, ip("10.0.0.1"));
        assert_eq!(records[1].address, ip("10.0.0.2"));
    }

    #[test]
    fn test_ipv6_and_extra_fields() {
        let entries = parse_entries("m1,nas,fd00::10,ignored;  ,printer , 10.0.0.9 ;");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mac.as_deref(), Some("m1"));
        assert_eq!(entries[0].record.address, ip("fd00::10"));
        assert_eq!(entries[1].mac, None);
        assert_eq!(entries[1].record.hostname, "printer");
    }

    #[test]
    fn test_record_display_is_ascii() {
        let record = HostRecord::new("nas", ip("10.0.0.5"));
        assert_eq!(record.to_string(), "nas -> 10.0.0.5");
    }
}
