//! CIDR parsing shared by the source decoder and the rule model.

use ipnet::IpNet;
use serde::de::Error as _;
use serde::Deserializer;
use std::net::IpAddr;

use super::listable;
use crate::{Error, Result};

/// Parse a CIDR string.
///
/// A bare address is accepted and becomes a host route (`/32` or `/128`).
/// Host bits are kept as written; `ipnet` masks them on lookup.
pub fn parse_cidr(pattern: &str) -> Result<IpNet> {
    let pattern = pattern.trim();

    if let Ok(net) = pattern.parse::<IpNet>() {
        return Ok(net);
    }

    if let Ok(addr) = pattern.parse::<IpAddr>() {
        return Ok(IpNet::from(addr));
    }

    Err(Error::InvalidCidr(pattern.to_string()))
}

/// Deserialize a string-or-array of CIDRs.
pub(crate) fn deserialize_list<'de, D>(deserializer: D) -> std::result::Result<Vec<IpNet>, D::Error>
where
    D: Deserializer<'de>,
{
    let patterns: Vec<String> = listable::deserialize(deserializer)?;
    patterns
        .iter()
        .map(|p| parse_cidr(p).map_err(D::Error::custom))
        .collect()
}
