//! Remote rule-set with conditional download, cache file and refresh loop.
//!
//! Data flow:
//! - `start_context` resolves the egress outbound, hydrates from the cache
//!   file and downloads synchronously only when the cache is unusable.
//! - `post_start` spawns one refresh thread that wakes every
//!   [`CHECK_INTERVAL`] and downloads once the update interval elapsed.
//! - Downloads send `If-None-Match` with the last `ETag`; a 200 replaces
//!   the rules and rewrites the cache file, a 304 only refreshes timestamps.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use super::callback::CallbackRegistry;
use super::state::RuleSetState;
use super::{CallbackHandle, RuleSet, RuleSetFormat, RuleSetKind, UpdateCallback};
use crate::http::{
    FetchResponse, HttpClient, StartContext, UreqClient, STATUS_NOT_MODIFIED, STATUS_OK,
};
use crate::ipset::IpSet;
use crate::outbound::{Dialer, Network, Router};
use crate::pause::PauseManager;
use crate::rule::HeadlessRule;
use crate::{Error, Result};

/// Update interval used when none is configured.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the refresh loop checks whether an update is due.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How often an in-flight download looks at the cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// What started a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Refresh loop; an unreferenced rule-set may stay evicted
    Scheduled,
    /// Start or explicit update; the rules must be loaded afterwards
    Manual,
}

/// Settings for a [`RemoteRuleSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub tag: String,
    pub url: String,
    /// Cache file
    pub path: PathBuf,
    pub format: RuleSetFormat,
    /// Outbound to download through; the router default when `None`
    pub download_detour: Option<String>,
    pub update_interval: Duration,
}

impl RemoteConfig {
    pub fn new(
        tag: impl Into<String>,
        url: impl Into<String>,
        path: impl Into<PathBuf>,
        format: RuleSetFormat,
    ) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
            path: path.into(),
            format,
            download_detour: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_download_detour(mut self, detour: impl Into<String>) -> Self {
        self.download_detour = Some(detour.into());
        self
    }

    /// Set the update interval. Zero selects [`DEFAULT_UPDATE_INTERVAL`].
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = if interval.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            interval
        };
        self
    }
}

/// Rule-set downloaded from a URL and kept fresh in the background.
///
/// # Example
///
/// ```ignore
/// use ruleset_provider::{AlwaysActive, RemoteConfig, RemoteRuleSet, RuleSet, RuleSetFormat};
/// use std::sync::Arc;
///
/// let config = RemoteConfig::new(
///     "geoip-cn",
///     "https://example.com/geoip-cn.srs",
///     "/var/cache/geoip-cn.srs",
///     RuleSetFormat::Binary,
/// );
/// let rs = RemoteRuleSet::new(config, router, Arc::new(AlwaysActive));
/// rs.start_context(None)?;
/// rs.post_start()?;
/// ```
pub struct RemoteRuleSet {
    inner: Arc<Inner>,
}

struct Inner {
    state: RuleSetState,
    url: String,
    download_detour: Option<String>,
    update_interval: Duration,
    router: Arc<dyn Router>,
    pause: Arc<dyn PauseManager>,
    client: Mutex<Option<Arc<dyn HttpClient>>>,
    etag: Mutex<Option<String>>,
    /// Start of the last download attempt; drives the schedule.
    last_attempt: Mutex<Option<SystemTime>>,
    /// Serializes whole downloads.
    fetch_lock: Mutex<()>,
    callbacks: CallbackRegistry,
    started: AtomicBool,
}

impl RemoteRuleSet {
    /// Capture configuration. No file or network access happens here.
    pub fn new(config: RemoteConfig, router: Arc<dyn Router>, pause: Arc<dyn PauseManager>) -> Self {
        let update_interval = if config.update_interval.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            config.update_interval
        };
        Self {
            inner: Arc::new(Inner {
                state: RuleSetState::new(config.tag, RuleSetKind::Remote, config.format, config.path),
                url: config.url,
                download_detour: config.download_detour,
                update_interval,
                router,
                pause,
                client: Mutex::new(None),
                etag: Mutex::new(None),
                last_attempt: Mutex::new(None),
                fetch_lock: Mutex::new(()),
                callbacks: CallbackRegistry::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn update_interval(&self) -> Duration {
        self.inner.update_interval
    }

    /// Validator from the most recent 200 response.
    pub fn etag(&self) -> Option<String> {
        self.inner.etag.lock().clone()
    }

    /// Run one scheduler check as of `now`.
    ///
    /// Downloads only if the update interval elapsed since the last
    /// attempt, after waiting for the pause manager. Returns `true` if a
    /// download was attempted.
    pub fn tick(&self, now: SystemTime) -> bool {
        self.inner.tick(now)
    }
}

impl Inner {
    fn tag(&self) -> &str {
        self.state.tag()
    }

    fn resolve_dialer(&self) -> Result<(String, Arc<dyn Dialer>)> {
        match &self.download_detour {
            Some(detour) => {
                let dialer = self
                    .router
                    .outbound(detour)
                    .ok_or_else(|| Error::DetourNotFound(detour.clone()))?;
                Ok((detour.clone(), dialer))
            }
            None => {
                let dialer = self.router.default_outbound(Network::Tcp).map_err(|e| {
                    log::debug!("rule-set {}: default outbound: {}", self.tag(), e);
                    Error::NoDefaultOutbound(Network::Tcp.to_string())
                })?;
                Ok((dialer.tag().to_string(), dialer))
            }
        }
    }

    fn start(&self, ctx: Option<&dyn StartContext>) -> Result<()> {
        self.state.ensure_open()?;

        let (detour, dialer) = self.resolve_dialer()?;
        let client: Arc<dyn HttpClient> = match ctx {
            Some(ctx) => ctx.http_client(&detour, &dialer)?,
            None => Arc::new(UreqClient::new(dialer.as_ref())?),
        };
        *self.client.lock() = Some(client);

        if self.state.path().exists() {
            if let Err(e) = self.load_cache() {
                log::warn!(
                    "rule-set {}: ignoring cache {:?}: {}",
                    self.tag(),
                    self.state.path(),
                    e
                );
            }
        }
        if self.state.has_rules() {
            return Ok(());
        }

        self.fetch_once(SystemTime::now(), Trigger::Manual).map_err(|e| {
            log::error!("rule-set {}: initial download failed: {}", self.tag(), e);
            e
        })
    }

    fn load_cache(&self) -> Result<()> {
        let (rules, modified) = self.state.read_file()?;
        let count = rules.len();
        self.state.replace(rules)?;
        self.state.set_updated_time(modified);
        *self.last_attempt.lock() = Some(modified);
        log::info!(
            "rule-set {}: loaded {} rules from cache {:?}",
            self.tag(),
            count,
            self.state.path()
        );
        Ok(())
    }

    fn run(&self) {
        self.tick(SystemTime::now());
        while !self.state.cancel_token().wait_timeout(CHECK_INTERVAL) {
            self.tick(SystemTime::now());
        }
        log::debug!("rule-set {}: refresh loop stopped", self.tag());
    }

    fn is_due(&self, now: SystemTime) -> bool {
        match *self.last_attempt.lock() {
            None => true,
            Some(last) => match now.duration_since(last) {
                Ok(elapsed) => elapsed >= self.update_interval,
                // clock went backwards
                Err(_) => false,
            },
        }
    }

    fn tick(&self, now: SystemTime) -> bool {
        if self.state.is_closed() || !self.is_due(now) {
            return false;
        }
        if !self.pause.wait_active(self.state.cancel_token()) {
            return false;
        }

        // a long pause must not stamp the attempt in the past
        let now = now.max(SystemTime::now());
        match self.fetch_once(now, Trigger::Scheduled) {
            Ok(()) => {
                if self.state.ref_count() == 0
                    && self.state.has_rules()
                    && self.state.file_usable()
                {
                    self.state.evict();
                    log::debug!("rule-set {}: unreferenced, rules released", self.tag());
                }
            }
            Err(Error::Closed(_)) => {}
            Err(e) => log::error!("rule-set {}: update failed: {}", self.tag(), e),
        }
        true
    }

    fn fetch_once(&self, now: SystemTime, trigger: Trigger) -> Result<()> {
        let _fetch = self.fetch_lock.lock();
        self.state.ensure_open()?;

        let client = self
            .client
            .lock()
            .clone()
            .ok_or_else(|| Error::Config(format!("rule-set {}: not started", self.tag())))?;
        let etag = self.etag.lock().clone();

        log::debug!("rule-set {}: updating from {}", self.tag(), self.url);
        *self.last_attempt.lock() = Some(now);
        let response = self.request(client, etag)?;
        self.state.ensure_open()?;

        match response.status {
            STATUS_OK => self.apply(response, now)?,
            STATUS_NOT_MODIFIED => self.not_modified(now, trigger)?,
            status => return Err(Error::UnexpectedStatus(status)),
        }

        self.state.ensure_open()?;
        self.callbacks.notify(self.tag());
        Ok(())
    }

    /// Run the GET on a worker thread so cancellation does not wait for
    /// the network. The worker's late result is dropped.
    fn request(&self, client: Arc<dyn HttpClient>, etag: Option<String>) -> Result<FetchResponse> {
        let (tx, rx) = mpsc::sync_channel(1);
        let url = self.url.clone();
        thread::Builder::new()
            .name(format!("ruleset-{}-fetch", self.tag()))
            .spawn(move || {
                let _ = tx.send(client.get(&url, etag.as_deref()));
            })?;

        let cancel = self.state.cancel_token();
        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        log::debug!("rule-set {}: download abandoned on close", self.tag());
                        return Err(Error::Closed(self.tag().to_string()));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Transport("download worker exited".to_string()))
                }
            }
        }
    }

    fn apply(&self, response: FetchResponse, now: SystemTime) -> Result<()> {
        let rules = self.state.format().decode(&response.body)?;
        let count = rules.len();
        self.state.replace(rules)?;
        self.state.set_updated_time(now);

        match write_cache(self.state.path(), &response.body) {
            Ok(()) => {
                self.state.set_file_stale(false);
                *self.etag.lock() = response.etag;
            }
            Err(e) => {
                log::warn!(
                    "rule-set {}: failed to save cache {:?}: {}",
                    self.tag(),
                    self.state.path(),
                    e
                );
                // the old file must not stand in for this data, and a 304
                // must not confirm it
                self.state.set_file_stale(true);
                *self.etag.lock() = None;
                if let Err(e) = fs::remove_file(self.state.path()) {
                    log::debug!("rule-set {}: remove old cache: {}", self.tag(), e);
                }
            }
        }

        log::info!("rule-set {}: updated, {} rules", self.tag(), count);
        Ok(())
    }

    fn not_modified(&self, now: SystemTime, trigger: Trigger) -> Result<()> {
        if !self.state.has_rules() {
            // unreferenced sets stay evicted on a scheduled check
            let result = if trigger == Trigger::Manual || self.state.ref_count() > 0 {
                self.state.rehydrate()
            } else if self.state.file_usable() {
                Ok(())
            } else {
                Err(Error::StaleFile(self.state.path().display().to_string()))
            };
            if let Err(e) = result {
                // next check downloads unconditionally
                *self.etag.lock() = None;
                *self.last_attempt.lock() = None;
                return Err(e);
            }
        }

        self.state.set_updated_time(now);
        if self.state.file_usable() {
            if let Err(e) = touch(self.state.path(), now) {
                log::warn!(
                    "rule-set {}: failed to touch cache {:?}: {}",
                    self.tag(),
                    self.state.path(),
                    e
                );
            }
        }

        log::info!("rule-set {}: not modified", self.tag());
        Ok(())
    }
}

/// Replace the cache file with `data` via a temporary file.
fn write_cache(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn touch(path: &Path, time: SystemTime) -> Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}

impl RuleSet for RemoteRuleSet {
    fn name(&self) -> &str {
        self.inner.state.tag()
    }

    fn kind(&self) -> RuleSetKind {
        self.inner.state.kind()
    }

    fn format(&self) -> RuleSetFormat {
        self.inner.state.format()
    }

    fn path(&self) -> &Path {
        self.inner.state.path()
    }

    fn start_context(&self, ctx: Option<&dyn StartContext>) -> Result<()> {
        self.inner.start(ctx)
    }

    fn post_start(&self) -> Result<()> {
        self.inner.state.ensure_open()?;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let inner = self.inner.clone();
        thread::Builder::new()
            .name(format!("ruleset-{}", self.inner.tag()))
            .spawn(move || inner.run())?;
        Ok(())
    }

    fn update(&self) -> Result<()> {
        self.inner.fetch_once(SystemTime::now(), Trigger::Manual)
    }

    fn rules(&self) -> Option<Arc<Vec<HeadlessRule>>> {
        self.inner.state.rules()
    }

    fn updated_time(&self) -> Option<SystemTime> {
        self.inner.state.updated_time()
    }

    fn extract_ip_set(&self) -> IpSet {
        self.inner.state.extract_ip_set()
    }

    fn inc_ref(&self) {
        self.inner.state.inc_ref();
    }

    fn dec_ref(&self) -> Result<()> {
        self.inner.state.dec_ref()
    }

    fn ref_count(&self) -> usize {
        self.inner.state.ref_count()
    }

    fn cleanup(&self) {
        self.inner.state.cleanup();
    }

    fn register_callback(&self, callback: UpdateCallback) -> Option<CallbackHandle> {
        Some(self.inner.callbacks.register(callback))
    }

    fn unregister_callback(&self, handle: CallbackHandle) {
        self.inner.callbacks.unregister(handle);
    }

    fn close(&self) -> Result<()> {
        self.inner.state.close();
        log::debug!("rule-set {}: closed", self.inner.tag());
        Ok(())
    }
}

impl Drop for RemoteRuleSet {
    fn drop(&mut self) {
        // stops the refresh thread, which holds its own reference to `inner`
        self.inner.state.cancel_token().cancel();
    }
}
