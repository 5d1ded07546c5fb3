//! Aggregated address sets extracted from rule-sets.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;

use crate::rule::HeadlessRule;

/// Union of CIDR ranges, stored aggregated and sorted.
///
/// Overlapping and adjacent ranges are merged, so `len` counts the
/// minimal set of prefixes covering the union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpSet {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl IpSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the union of the given ranges.
    pub fn from_nets<I: IntoIterator<Item = IpNet>>(nets: I) -> Self {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for net in nets {
            match net {
                IpNet::V4(n) => v4.push(n),
                IpNet::V6(n) => v6.push(n),
            }
        }
        Self {
            v4: Ipv4Net::aggregate(&v4),
            v6: Ipv6Net::aggregate(&v6),
        }
    }

    /// Collect every destination CIDR from a rule sequence.
    pub fn from_rules(rules: &[HeadlessRule]) -> Self {
        let mut nets = Vec::new();
        for rule in rules {
            rule.collect_ip_cidrs(&mut nets);
        }
        Self::from_nets(nets)
    }

    /// Check if an address falls inside the set.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                let idx = self.v4.partition_point(|n| n.network() <= *v4);
                idx > 0 && self.v4[idx - 1].contains(v4)
            }
            IpAddr::V6(v6) => {
                let idx = self.v6.partition_point(|n| n.network() <= *v6);
                idx > 0 && self.v6[idx - 1].contains(v6)
            }
        }
    }

    /// Number of aggregated prefixes.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the aggregated prefixes, IPv4 first.
    pub fn iter(&self) -> impl Iterator<Item = IpNet> + '_ {
        self.v4
            .iter()
            .copied()
            .map(IpNet::V4)
            .chain(self.v6.iter().copied().map(IpNet::V6))
    }

    /// Merge another set into a new one.
    pub fn union(&self, other: &IpSet) -> IpSet {
        IpSet::from_nets(self.iter().chain(other.iter()))
    }
}
