//! Rule-set providers.
//!
//! A rule-set is a named, shared list of headless rules. Two providers
//! exist:
//!
//! - [`LocalRuleSet`]: loaded from a file at construction, refreshed only
//!   by explicit [`RuleSet::update`] calls.
//! - [`RemoteRuleSet`]: hydrated from a cache file or downloaded with a
//!   conditional GET, then kept fresh by a background refresh loop.
//!
//! Both hand out rule snapshots through an atomic swap: a reader holding a
//! snapshot keeps seeing consistent data while a refresh installs the next
//! one. Routing rules pin a rule-set with [`RuleSet::inc_ref`]; when the
//! count is zero, [`RuleSet::cleanup`] may release the data.

mod callback;
mod config;
mod local;
mod refs;
mod remote;
mod state;

pub use callback::{CallbackHandle, CallbackRegistry, UpdateCallback};
pub use config::{new_rule_set, parse_duration, LocalOptions, RemoteOptions, RuleSetOptions};
pub use local::LocalRuleSet;
pub use refs::{RefCounter, RefUnderflow};
pub use remote::{RemoteConfig, RemoteRuleSet, CHECK_INTERVAL, DEFAULT_UPDATE_INTERVAL};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::binary::BinaryRuleReader;
use crate::http::StartContext;
use crate::ipset::IpSet;
use crate::rule::HeadlessRule;
use crate::source::SourceParser;
use crate::Result;

/// Where a rule-set gets its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSetKind {
    Local,
    Remote,
}

impl RuleSetKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RuleSetKind::Local => "local",
            RuleSetKind::Remote => "remote",
        }
    }
}

impl fmt::Display for RuleSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of a rule-set file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetFormat {
    /// JSON source document
    Source,
    /// Compiled `SRS` file
    Binary,
}

impl RuleSetFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RuleSetFormat::Source => "source",
            RuleSetFormat::Binary => "binary",
        }
    }

    /// Conventional file extension.
    pub const fn extension(&self) -> &'static str {
        match self {
            RuleSetFormat::Source => "json",
            RuleSetFormat::Binary => "srs",
        }
    }

    /// Infer the format from a file path or URL.
    ///
    /// Query strings and fragments are ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        let end = path.find(['?', '#']).unwrap_or(path.len());
        let path = path[..end].to_ascii_lowercase();
        if path.ends_with(".json") {
            Some(RuleSetFormat::Source)
        } else if path.ends_with(".srs") {
            Some(RuleSetFormat::Binary)
        } else {
            None
        }
    }

    /// Decode and validate rules in this format.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<HeadlessRule>> {
        match self {
            RuleSetFormat::Source => SourceParser::parse(data),
            RuleSetFormat::Binary => BinaryRuleReader::decode(data),
        }
    }
}

impl fmt::Display for RuleSetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named rule-set as seen by the router.
pub trait RuleSet: Send + Sync {
    /// Tag the router looks this rule-set up by.
    fn name(&self) -> &str;

    fn kind(&self) -> RuleSetKind;

    fn format(&self) -> RuleSetFormat;

    /// Backing file (local) or cache file (remote).
    fn path(&self) -> &Path;

    /// Resolve dependencies and load initial data.
    fn start_context(&self, ctx: Option<&dyn StartContext>) -> Result<()>;

    /// Start background work. Must not block.
    fn post_start(&self) -> Result<()>;

    /// Refresh now, outside any schedule.
    fn update(&self) -> Result<()>;

    /// Current snapshot, `None` while evicted or after close.
    fn rules(&self) -> Option<Arc<Vec<HeadlessRule>>>;

    /// Time of the last successful refresh.
    fn updated_time(&self) -> Option<SystemTime>;

    /// Union of every destination CIDR in the current rules.
    fn extract_ip_set(&self) -> IpSet;

    fn inc_ref(&self);

    /// Release one reference.
    ///
    /// Fails with [`Error::NegativeRefs`](crate::Error::NegativeRefs) when
    /// there is no matching `inc_ref`; the count stays at zero.
    fn dec_ref(&self) -> Result<()>;

    fn ref_count(&self) -> usize;

    /// Release the rules if nothing references this rule-set.
    fn cleanup(&self);

    /// Subscribe to refresh notifications.
    ///
    /// Returns `None` for rule-sets that never refresh on their own.
    fn register_callback(&self, callback: UpdateCallback) -> Option<CallbackHandle>;

    fn unregister_callback(&self, handle: CallbackHandle);

    /// Stop background work and drop the rules.
    fn close(&self) -> Result<()>;
}
