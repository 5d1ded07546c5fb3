//! Headless rule model.
//!
//! A rule-set is an ordered list of headless rules: predicates without an
//! outbound action. The router decides what a match means.

mod cidr;
mod default;
mod listable;
mod logical;

pub use cidr::parse_cidr;
pub use default::DefaultRule;
pub use logical::{LogicalMode, LogicalRule};

use ipnet::IpNet;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Result;

/// One predicate in a rule-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessRule {
    Default(DefaultRule),
    Logical(LogicalRule),
}

impl HeadlessRule {
    /// Validate this rule (and nested rules for logical ones).
    pub fn validate(&self) -> Result<()> {
        match self {
            HeadlessRule::Default(rule) => rule.validate(),
            HeadlessRule::Logical(rule) => rule.validate(),
        }
    }

    /// Append every destination CIDR carried by this rule to `out`.
    pub fn collect_ip_cidrs(&self, out: &mut Vec<IpNet>) {
        match self {
            HeadlessRule::Default(rule) => out.extend_from_slice(&rule.ip_cidr),
            HeadlessRule::Logical(rule) => {
                for sub in &rule.rules {
                    sub.collect_ip_cidrs(out);
                }
            }
        }
    }
}

impl From<DefaultRule> for HeadlessRule {
    fn from(rule: DefaultRule) -> Self {
        HeadlessRule::Default(rule)
    }
}

impl From<LogicalRule> for HeadlessRule {
    fn from(rule: LogicalRule) -> Self {
        HeadlessRule::Logical(rule)
    }
}

impl Serialize for HeadlessRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(flatten)]
            rule: &'a LogicalRule,
        }

        match self {
            HeadlessRule::Default(rule) => rule.serialize(serializer),
            HeadlessRule::Logical(rule) => Tagged {
                kind: "logical",
                rule,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for HeadlessRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut value = serde_json::Value::deserialize(deserializer)?;
        let kind = match value.as_object_mut() {
            Some(obj) => obj.remove("type"),
            None => return Err(D::Error::custom("rule must be an object")),
        };

        match kind.as_ref().and_then(|k| k.as_str()).unwrap_or("default") {
            "" | "default" => serde_json::from_value(value)
                .map(HeadlessRule::Default)
                .map_err(D::Error::custom),
            "logical" => serde_json::from_value(value)
                .map(HeadlessRule::Logical)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("unknown rule type: {}", other))),
        }
    }
}
