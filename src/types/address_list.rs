//! Operator-supplied CIDR lists.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ipnetwork::IpNetwork;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString};
use utoipa::ToSchema;

/// Which of the two optional lists an input feeds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    StrumDisplay,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ListKind {
    /// Addresses exempt from the rate-based block.
    Allow,
    /// Addresses always blocked.
    Deny,
}

impl ListKind {
    /// Location of the list inside its input file, as (object key, list key).
    pub fn source_path(self) -> (&'static str, &'static str) {
        match self {
            ListKind::Allow => ("ipRatebased", "allowList"),
            ListKind::Deny => ("ipRestriction", "denyList"),
        }
    }
}

/// Parse `entry` as `<ip>/<prefix>`. A bare address without a prefix is rejected.
pub fn parse_cidr(entry: &str) -> Option<IpNetwork> {
    if !entry.contains('/') {
        return None;
    }
    IpNetwork::from_str(entry).ok()
}

pub fn is_valid_cidr(entry: &str) -> bool {
    parse_cidr(entry).is_some()
}

/// An ordered, non-empty list of validated CIDR ranges.
///
/// "No list" and "empty list" are both represented by the absence of an
/// `AddressList`; see [`AddressList::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AddressList(Vec<String>);

impl AddressList {
    /// Validate `entries`.
    ///
    /// Returns `Ok(None)` for an empty input and `Err(entry)` with the first
    /// entry that is not a CIDR range. Entries are stored in canonical form.
    pub fn parse<I, S>(entries: I) -> Result<Option<Self>, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            let network = parse_cidr(entry).ok_or_else(|| entry.to_string())?;
            out.push(network.to_string());
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AddressList(out)))
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for AddressList {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        v4_host = { "127.0.0.1/32" },
        v4_net = { "203.0.113.0/24" },
        v4_any = { "0.0.0.0/0" },
        v6_net = { "2001:db8::/32" },
        v6_host = { "::1/128" },
    )]
    fn test_valid_cidr(entry: &str) {
        assert!(is_valid_cidr(entry));
    }

    #[parameterized(
        no_prefix = { "10.0.0.1" },
        prefix_too_long_v4 = { "10.0.0.0/33" },
        prefix_too_long_v6 = { "2001:db8::/129" },
        not_an_address = { "example.com/24" },
        garbage_prefix = { "10.0.0.0/eight" },
        empty_prefix = { "10.0.0.0/" },
        empty = { "" },
    )]
    fn test_invalid_cidr(entry: &str) {
        assert!(!is_valid_cidr(entry));
    }

    #[test]
    fn test_parse_empty_is_none() {
        let parsed = AddressList::parse(Vec::<String>::new()).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_keeps_order_and_trims() {
        let list = AddressList::parse([" 10.0.0.0/8", "192.0.2.0/24 "]).unwrap().unwrap();
        assert_eq!(list.entries(), &["10.0.0.0/8", "192.0.2.0/24"]);
        assert_eq!(list.len(), 2);
        assert!(!list.is_empty());
    }

    #[parameterized(
        v4 = { "203.0.113.0/24", "203.0.113.0/24" },
        v6_compressed = { "2001:0db8:0000::/32", "2001:db8::/32" },
    )]
    fn test_parse_stores_canonical_form(entry: &str, expected: &str) {
        let list = AddressList::parse([entry]).unwrap().unwrap();
        assert_eq!(list.entries(), &[expected]);
    }

    #[test]
    fn test_parse_cidr_keeps_family_and_prefix() {
        let net = parse_cidr("192.0.2.0/24").unwrap();
        assert!(net.is_ipv4());
        assert_eq!(net.prefix(), 24);
        assert!(parse_cidr("192.0.2.1").is_none());
    }

    #[test]
    fn test_parse_reports_first_invalid_entry() {
        let err = AddressList::parse(["10.0.0.0/8", "nope", "also-nope"]).unwrap_err();
        assert_eq!(err, "nope");
    }

    #[test]
    fn test_list_kind_source_path() {
        assert_eq!(ListKind::Allow.source_path(), ("ipRatebased", "allowList"));
        assert_eq!(ListKind::Deny.source_path(), ("ipRestriction", "denyList"));
        assert_eq!(ListKind::Deny.to_string(), "deny");
    }
}
