//! Default (leaf) headless rule.

use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{cidr, listable};
use crate::{Error, Result};

/// A leaf predicate: every non-empty item list contributes one condition.
///
/// Matching semantics belong to the router; this type only carries and
/// validates the items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub domain: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub domain_suffix: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub domain_keyword: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub domain_regex: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "cidr::deserialize_list")]
    pub source_ip_cidr: Vec<IpNet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "cidr::deserialize_list")]
    pub ip_cidr: Vec<IpNet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub source_port: Vec<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub port: Vec<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub process_name: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub process_path: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub package_name: Vec<String>,

    /// `tcp` or `udp`
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "listable::deserialize")]
    pub network: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

impl DefaultRule {
    /// Check if this rule carries no conditions at all.
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
            && self.domain_suffix.is_empty()
            && self.domain_keyword.is_empty()
            && self.domain_regex.is_empty()
            && self.source_ip_cidr.is_empty()
            && self.ip_cidr.is_empty()
            && self.source_port.is_empty()
            && self.port.is_empty()
            && self.process_name.is_empty()
            && self.process_path.is_empty()
            && self.package_name.is_empty()
            && self.network.is_empty()
    }

    /// Check if this rule has a destination address condition.
    pub fn has_ip_cidr(&self) -> bool {
        !self.ip_cidr.is_empty()
    }

    /// Validate item contents.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidRule("missing conditions".to_string()));
        }

        for pattern in &self.domain_regex {
            Regex::new(pattern)?;
        }

        for network in &self.network {
            if !matches!(network.as_str(), "tcp" | "udp") {
                return Err(Error::InvalidRule(format!("unknown network: {}", network)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listable_fields() {
        let rule: DefaultRule = serde_json::from_str(
            r#"{"domain": "example.com", "domain_suffix": [".google.com", "youtube.com"], "port": 443}"#,
        )
        .unwrap();

        assert_eq!(rule.domain, vec!["example.com"]);
        assert_eq!(rule.domain_suffix.len(), 2);
        assert_eq!(rule.port, vec![443]);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_empty_rule_rejected() {
        let rule: DefaultRule = serde_json::from_str("{}").unwrap();
        assert!(rule.is_empty());
        assert!(rule.validate().is_err());

        let inverted: DefaultRule = serde_json::from_str(r#"{"invert": true}"#).unwrap();
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_bad_regex_rejected() {
        let rule: DefaultRule = serde_json::from_str(r#"{"domain_regex": "(unclosed"}"#).unwrap();
        assert!(matches!(rule.validate(), Err(Error::InvalidRegex(_))));
    }

    #[test]
    fn test_bad_network_rejected() {
        let rule: DefaultRule = serde_json::from_str(r#"{"network": "icmp"}"#).unwrap();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<DefaultRule>(r#"{"domian": "typo.com"}"#).is_err());
    }

    #[test]
    fn test_serialize_skips_empty() {
        let rule = DefaultRule {
            domain: vec!["example.com".to_string()],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&rule).unwrap(),
            r#"{"domain":["example.com"]}"#
        );
    }
}
