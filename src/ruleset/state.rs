//! State shared by local and remote rule-sets.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::refs::RefCounter;
use super::{RuleSetFormat, RuleSetKind};
use crate::cancel::CancelToken;
use crate::ipset::IpSet;
use crate::rule::HeadlessRule;
use crate::{Error, Result};

pub(crate) struct RuleSetState {
    tag: String,
    kind: RuleSetKind,
    format: RuleSetFormat,
    path: PathBuf,
    /// Current snapshot; `None` once evicted or closed.
    rules: ArcSwapOption<Vec<HeadlessRule>>,
    /// Bumped on every successful replacement.
    generation: AtomicU64,
    updated: Mutex<Option<SystemTime>>,
    refs: RefCounter,
    cancel: CancelToken,
    /// Orders replacements against `close`.
    swap_lock: Mutex<()>,
    /// Set when the backing file no longer holds the current data.
    file_stale: AtomicBool,
}

impl RuleSetState {
    pub fn new(tag: String, kind: RuleSetKind, format: RuleSetFormat, path: PathBuf) -> Self {
        Self {
            tag,
            kind,
            format,
            path,
            rules: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            updated: Mutex::new(None),
            refs: RefCounter::new(),
            cancel: CancelToken::new(),
            swap_lock: Mutex::new(()),
            file_stale: AtomicBool::new(false),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> RuleSetKind {
        self.kind
    }

    pub fn format(&self) -> RuleSetFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed(self.tag.clone()));
        }
        Ok(())
    }

    pub fn rules(&self) -> Option<Arc<Vec<HeadlessRule>>> {
        self.rules.load_full()
    }

    pub fn has_rules(&self) -> bool {
        self.rules.load().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn updated_time(&self) -> Option<SystemTime> {
        *self.updated.lock()
    }

    pub fn set_updated_time(&self, time: SystemTime) {
        *self.updated.lock() = Some(time);
    }

    /// Atomically install a new snapshot.
    ///
    /// Fails without touching the current snapshot once the rule-set is
    /// closed.
    pub fn replace(&self, rules: Vec<HeadlessRule>) -> Result<()> {
        let rules = Arc::new(rules);
        let _guard = self.swap_lock.lock();
        self.ensure_open()?;
        self.rules.store(Some(rules));
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Read and decode the backing file.
    ///
    /// Returns the rules and the file modification time.
    pub fn read_file(&self) -> Result<(Vec<HeadlessRule>, SystemTime)> {
        let data = fs::read(&self.path)?;
        let modified = fs::metadata(&self.path)?.modified()?;
        let rules = self.format.decode(&data)?;
        Ok((rules, modified))
    }

    pub fn set_file_stale(&self, stale: bool) {
        self.file_stale.store(stale, Ordering::Release);
    }

    /// Whether evicted rules can be reloaded from the backing file.
    pub fn file_usable(&self) -> bool {
        !self.file_stale.load(Ordering::Acquire) && self.path.exists()
    }

    /// Reload evicted rules from the backing file.
    ///
    /// `updated_time` is left alone; the data did not change.
    pub fn rehydrate(&self) -> Result<()> {
        if self.has_rules() {
            return Ok(());
        }
        if self.file_stale.load(Ordering::Acquire) {
            return Err(Error::StaleFile(self.path.display().to_string()));
        }
        let (rules, _) = self.read_file()?;
        let count = rules.len();
        self.replace(rules)?;
        log::debug!("rule-set {}: reloaded {} rules from {:?}", self.tag, count, self.path);
        Ok(())
    }

    pub fn extract_ip_set(&self) -> IpSet {
        match self.rules() {
            Some(rules) => IpSet::from_rules(&rules),
            None => IpSet::new(),
        }
    }

    /// Take a reference; the first one reloads evicted rules from disk.
    pub fn inc_ref(&self) {
        if self.refs.increment() != 1 || self.has_rules() || self.is_closed() {
            return;
        }
        if !self.file_usable() {
            return;
        }
        if let Err(e) = self.rehydrate() {
            log::warn!("rule-set {}: reload from {:?} failed: {}", self.tag, self.path, e);
        }
    }

    pub fn dec_ref(&self) -> Result<()> {
        self.refs
            .decrement()
            .map(|_| ())
            .map_err(|_| Error::NegativeRefs(self.tag.clone()))
    }

    pub fn ref_count(&self) -> usize {
        self.refs.get()
    }

    /// Drop the snapshot. Readers holding it keep their copy.
    pub fn evict(&self) {
        self.rules.store(None);
    }

    /// Drop the snapshot if nothing references this rule-set and it can be
    /// reloaded later.
    pub fn cleanup(&self) {
        if self.refs.get() == 0 && self.has_rules() && !self.file_stale.load(Ordering::Acquire) {
            self.evict();
            log::debug!("rule-set {}: unreferenced, rules released", self.tag);
        }
    }

    /// Cancel the owning context and drop the snapshot.
    ///
    /// A replacement racing with this call either lands before it (and is
    /// dropped here) or observes the cancellation and is discarded.
    pub fn close(&self) {
        self.cancel.cancel();
        let _guard = self.swap_lock.lock();
        self.rules.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceWriter;
    use crate::rule::DefaultRule;

    fn rule(domain: &str) -> HeadlessRule {
        HeadlessRule::Default(DefaultRule {
            domain: vec![domain.to_string()],
            ..Default::default()
        })
    }

    fn state(path: PathBuf) -> RuleSetState {
        RuleSetState::new(
            "test".to_string(),
            RuleSetKind::Local,
            RuleSetFormat::Source,
            path,
        )
    }

    #[test]
    fn test_replace_and_snapshot() {
        let s = state(PathBuf::from("unused.json"));
        assert!(s.rules().is_none());

        s.replace(vec![rule("a.com")]).unwrap();
        let first = s.rules().unwrap();
        s.replace(vec![rule("b.com"), rule("c.com")]).unwrap();

        // old snapshot stays intact for its holder
        assert_eq!(first.len(), 1);
        assert_eq!(s.rules().unwrap().len(), 2);
        assert_eq!(s.generation(), 2);
    }

    #[test]
    fn test_replace_after_close_is_rejected() {
        let s = state(PathBuf::from("unused.json"));
        s.replace(vec![rule("a.com")]).unwrap();
        s.close();

        assert!(s.rules().is_none());
        assert!(matches!(s.replace(vec![rule("b.com")]), Err(Error::Closed(_))));
        assert!(s.rules().is_none());
    }

    #[test]
    fn test_cleanup_respects_refs() {
        let s = state(PathBuf::from("unused.json"));
        s.replace(vec![rule("a.com")]).unwrap();

        s.inc_ref();
        s.cleanup();
        assert!(s.has_rules());

        s.dec_ref().unwrap();
        s.cleanup();
        assert!(!s.has_rules());

        assert!(matches!(s.dec_ref(), Err(Error::NegativeRefs(_))));
        assert_eq!(s.ref_count(), 0);
    }

    #[test]
    fn test_first_ref_reloads_evicted_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, SourceWriter::write(&[rule("a.com")]).unwrap()).unwrap();

        let s = state(path);
        s.rehydrate().unwrap();
        s.cleanup();
        assert!(!s.has_rules());

        s.inc_ref();
        assert_eq!(s.rules().unwrap().len(), 1);
    }

    #[test]
    fn test_rehydrate_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, SourceWriter::write(&[rule("a.com")]).unwrap()).unwrap();

        let s = state(path);
        s.rehydrate().unwrap();
        assert_eq!(s.rules().unwrap().len(), 1);
        assert!(s.updated_time().is_none());

        // already present: no reload
        let generation = s.generation();
        s.rehydrate().unwrap();
        assert_eq!(s.generation(), generation);
    }

    #[test]
    fn test_stale_file_is_never_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, SourceWriter::write(&[rule("old.com")]).unwrap()).unwrap();

        let s = state(path);
        s.replace(vec![rule("new.com"), rule("new.org")]).unwrap();
        s.set_file_stale(true);
        assert!(!s.file_usable());

        // keeps the only good copy
        s.cleanup();
        assert_eq!(s.rules().unwrap().len(), 2);

        s.evict();
        assert!(matches!(s.rehydrate(), Err(Error::StaleFile(_))));
        s.inc_ref();
        assert!(s.rules().is_none());

        s.set_file_stale(false);
        assert!(s.file_usable());
        s.rehydrate().unwrap();
        assert_eq!(s.rules().unwrap().len(), 1);
    }
}
