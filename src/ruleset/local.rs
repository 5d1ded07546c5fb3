//! File-backed rule-set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::state::RuleSetState;
use super::{CallbackHandle, RuleSet, RuleSetFormat, RuleSetKind, UpdateCallback};
use crate::http::StartContext;
use crate::ipset::IpSet;
use crate::rule::HeadlessRule;
use crate::{Error, Result};

/// Rule-set loaded from a local file.
///
/// Construction reads the file, so a `LocalRuleSet` is never half-loaded.
/// Refreshing is up to the caller: [`RuleSet::update`] re-reads the file
/// and keeps the current rules if the new content does not parse.
///
/// # Example
///
/// ```ignore
/// use ruleset_provider::{LocalRuleSet, RuleSet};
///
/// let rs = LocalRuleSet::new("geosite-cn", "/etc/rules/geosite-cn.srs", None)?;
/// println!("{} rules", rs.rules().map(|r| r.len()).unwrap_or(0));
/// ```
pub struct LocalRuleSet {
    state: RuleSetState,
}

impl LocalRuleSet {
    /// Load a rule-set from `path`.
    ///
    /// When `format` is `None` it is inferred from the file extension.
    pub fn new(
        tag: impl Into<String>,
        path: impl Into<PathBuf>,
        format: Option<RuleSetFormat>,
    ) -> Result<Self> {
        let tag = tag.into();
        let path = path.into();
        let format = match format {
            Some(format) => format,
            None => RuleSetFormat::from_path(&path.to_string_lossy()).ok_or_else(|| {
                Error::Config(format!("rule-set {}: unable to infer format of {:?}", tag, path))
            })?,
        };

        let rule_set = Self {
            state: RuleSetState::new(tag, RuleSetKind::Local, format, path),
        };
        rule_set.reload()?;
        Ok(rule_set)
    }

    fn reload(&self) -> Result<()> {
        self.state.ensure_open()?;
        let (rules, _) = self.state.read_file()?;
        let count = rules.len();
        self.state.replace(rules)?;
        self.state.set_updated_time(SystemTime::now());
        log::info!(
            "rule-set {}: loaded {} rules from {:?}",
            self.state.tag(),
            count,
            self.state.path()
        );
        Ok(())
    }
}

impl RuleSet for LocalRuleSet {
    fn name(&self) -> &str {
        self.state.tag()
    }

    fn kind(&self) -> RuleSetKind {
        self.state.kind()
    }

    fn format(&self) -> RuleSetFormat {
        self.state.format()
    }

    fn path(&self) -> &Path {
        self.state.path()
    }

    fn start_context(&self, _ctx: Option<&dyn StartContext>) -> Result<()> {
        Ok(())
    }

    fn post_start(&self) -> Result<()> {
        Ok(())
    }

    fn update(&self) -> Result<()> {
        self.reload()
    }

    fn rules(&self) -> Option<Arc<Vec<HeadlessRule>>> {
        self.state.rules()
    }

    fn updated_time(&self) -> Option<SystemTime> {
        self.state.updated_time()
    }

    fn extract_ip_set(&self) -> IpSet {
        self.state.extract_ip_set()
    }

    fn inc_ref(&self) {
        self.state.inc_ref();
    }

    fn dec_ref(&self) -> Result<()> {
        self.state.dec_ref()
    }

    fn ref_count(&self) -> usize {
        self.state.ref_count()
    }

    fn cleanup(&self) {
        self.state.cleanup();
    }

    fn register_callback(&self, _callback: UpdateCallback) -> Option<CallbackHandle> {
        None
    }

    fn unregister_callback(&self, _handle: CallbackHandle) {}

    fn close(&self) -> Result<()> {
        self.state.close();
        Ok(())
    }
}
