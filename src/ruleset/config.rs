//! Rule-set options and the provider factory.
//!
//! ```json
//! [
//!   {"type": "local", "tag": "private", "path": "private.json"},
//!   {
//!     "type": "remote",
//!     "tag": "geoip-cn",
//!     "url": "https://example.com/geoip-cn.srs",
//!     "download_detour": "proxy",
//!     "update_interval": "1d"
//!   }
//! ]
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::remote::RemoteConfig;
use super::{LocalRuleSet, RemoteRuleSet, RuleSet, RuleSetFormat};
use crate::outbound::Router;
use crate::pause::PauseManager;
use crate::{Error, Result};

/// Options for one rule-set, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleSetOptions {
    Local(LocalOptions),
    Remote(RemoteOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalOptions {
    pub tag: String,
    #[serde(default)]
    pub format: Option<RuleSetFormat>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOptions {
    pub tag: String,
    #[serde(default)]
    pub format: Option<RuleSetFormat>,
    /// Cache file; `<tag>.<ext>` when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub url: String,
    #[serde(default)]
    pub download_detour: Option<String>,
    #[serde(default, deserialize_with = "deserialize_interval")]
    pub update_interval: Option<Duration>,
}

impl RuleSetOptions {
    pub fn tag(&self) -> &str {
        match self {
            RuleSetOptions::Local(o) => &o.tag,
            RuleSetOptions::Remote(o) => &o.tag,
        }
    }
}

impl RemoteOptions {
    /// Resolve defaults into a [`RemoteConfig`].
    pub fn to_config(&self) -> Result<RemoteConfig> {
        if self.url.is_empty() {
            return Err(Error::Config(format!("rule-set {}: missing url", self.tag)));
        }

        let format = match self.format {
            Some(format) => format,
            None => RuleSetFormat::from_path(&self.url).ok_or_else(|| {
                Error::Config(format!(
                    "rule-set {}: unable to infer format from url {}",
                    self.tag, self.url
                ))
            })?,
        };
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.{}", self.tag, format.extension())));

        let mut config = RemoteConfig::new(&self.tag, &self.url, path, format)
            .with_update_interval(self.update_interval.unwrap_or_default());
        if let Some(detour) = self.download_detour.as_deref().filter(|d| !d.is_empty()) {
            config = config.with_download_detour(detour);
        }
        Ok(config)
    }
}

/// Build the provider described by `options`.
///
/// Local rule-sets read their file here; remote ones do no I/O until
/// [`RuleSet::start_context`].
pub fn new_rule_set(
    options: &RuleSetOptions,
    router: Arc<dyn Router>,
    pause: Arc<dyn PauseManager>,
) -> Result<Arc<dyn RuleSet>> {
    if options.tag().is_empty() {
        return Err(Error::Config("rule-set tag must not be empty".to_string()));
    }

    match options {
        RuleSetOptions::Local(o) => Ok(Arc::new(LocalRuleSet::new(&o.tag, &o.path, o.format)?)),
        RuleSetOptions::Remote(o) => Ok(Arc::new(RemoteRuleSet::new(o.to_config()?, router, pause))),
    }
}

fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) => parse_duration(&text).map(Some).map_err(D::Error::custom),
    }
}

/// Parse a duration like `"1d"`, `"24h"`, `"1h30m"`, `"90s"` or `"500ms"`.
///
/// A bare number is seconds.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || Error::Config(format!("invalid duration: {:?}", text));

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let step = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            "d" => Duration::from_secs(value.checked_mul(86400).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(step).ok_or_else(invalid)?;
    }
    Ok(total)
}
