//! ruleset-provider - Rule-set providers for a proxy router.
//!
//! A rule-set is a named, reusable list of routing predicates (domain, IP,
//! port and process matchers) that the router consults when deciding how to
//! handle a connection. This crate loads rule-sets, keeps them fresh and
//! shares them between routing rules.
//!
//! # Features
//!
//! - **Local rule-sets**: loaded from a source (JSON) or compiled file
//! - **Remote rule-sets**: downloaded with `If-None-Match` / `ETag`,
//!   persisted to a cache file, refreshed by a background thread
//! - **Hot swap**: rule snapshots are replaced atomically; readers never see
//!   a half-updated list
//! - **Reference counting**: unreferenced rule-sets may drop their data and
//!   reload it on demand
//! - **Pause support**: periodic downloads wait while the platform is paused
//! - **IP set extraction**: the union of every destination CIDR, for
//!   address-based route optimizations
//!
//! # Quick Start
//!
//! ```ignore
//! use ruleset_provider::{new_rule_set, AlwaysActive, RuleSet, RuleSetOptions};
//! use std::sync::Arc;
//!
//! let options: RuleSetOptions = serde_json::from_str(r#"{
//!     "type": "remote",
//!     "tag": "geoip-cn",
//!     "url": "https://example.com/geoip-cn.srs",
//!     "update_interval": "1d"
//! }"#)?;
//!
//! let rule_set = new_rule_set(&options, router, Arc::new(AlwaysActive))?;
//! rule_set.start_context(None)?;
//! rule_set.post_start()?;
//!
//! rule_set.inc_ref();
//! let ips = rule_set.extract_ip_set();
//! ```
//!
//! # Formats
//!
//! - **source**: `{"version": 3, "rules": [...]}` JSON documents
//! - **binary**: compiled `SRS` files, see [`binary`]

mod error;

pub mod binary;
pub mod cancel;
pub mod http;
pub mod ipset;
pub mod outbound;
pub mod pause;
pub mod rule;
pub mod ruleset;
pub mod source;

// Re-export core types
pub use error::{Error, Result};
pub use ipset::IpSet;
pub use rule::{DefaultRule, HeadlessRule, LogicalMode, LogicalRule};

// Re-export providers
pub use ruleset::{
    new_rule_set, CallbackHandle, LocalRuleSet, RemoteConfig, RemoteRuleSet, RuleSet,
    RuleSetFormat, RuleSetKind, RuleSetOptions, UpdateCallback,
};

// Re-export collaborator traits
pub use cancel::CancelToken;
pub use http::{FetchResponse, HttpClient, SharedHttpClients, StartContext, UreqClient};
pub use outbound::{Dialer, DirectDialer, Network, ProxyDialer, Router};
pub use pause::{AlwaysActive, PauseController, PauseManager};

// Re-export format codecs
pub use binary::{BinaryRuleReader, BinaryRuleWriter};
pub use source::{SourceParser, SourceWriter};
