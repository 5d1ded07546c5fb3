//! Logical (composite) headless rule.

use serde::{Deserialize, Serialize};

use super::HeadlessRule;
use crate::{Error, Result};

/// How sub-rule results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalMode {
    And,
    Or,
}

impl LogicalMode {
    /// Convert to a u8 value for binary serialization.
    pub fn as_u8(self) -> u8 {
        match self {
            LogicalMode::And => 0,
            LogicalMode::Or => 1,
        }
    }

    /// Convert from a u8 value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LogicalMode::And),
            1 => Some(LogicalMode::Or),
            _ => None,
        }
    }
}

/// Combines nested rules with AND / OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogicalRule {
    pub mode: LogicalMode,
    pub rules: Vec<HeadlessRule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

impl LogicalRule {
    /// Validate this rule and every nested rule.
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(Error::InvalidRule("logical rule without sub-rules".to_string()));
        }
        self.rules.iter().try_for_each(HeadlessRule::validate)
    }
}
