//! Conditional HTTP fetching for remote rule-sets.
//!
//! [`HttpClient`] is the seam between the fetch protocol and the wire.
//! [`UreqClient`] is the default implementation; a [`StartContext`] may
//! share clients between rule-sets that use the same detour.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::outbound::Dialer;
use crate::{Error, Result};

/// Connect timeout (TCP + TLS handshake) for rule-set downloads.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest wait for a single read once connected.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on a whole request, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Header carrying the validator sent back to the server.
pub const IF_NONE_MATCH: &str = "If-None-Match";

/// Status code of a full response.
pub const STATUS_OK: u16 = 200;

/// Status code of a conditional hit.
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Response to a conditional GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// `ETag` header, if the server sent one
    pub etag: Option<String>,
    /// Body bytes; empty unless the status is 200
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// A 200 response with a body.
    pub fn ok(body: impl Into<Vec<u8>>, etag: Option<&str>) -> Self {
        Self {
            status: STATUS_OK,
            etag: etag.map(str::to_string),
            body: body.into(),
        }
    }

    /// A 304 response.
    pub fn not_modified() -> Self {
        Self {
            status: STATUS_NOT_MODIFIED,
            etag: None,
            body: Vec::new(),
        }
    }
}

/// Blocking client able to issue a conditional GET.
pub trait HttpClient: Send + Sync {
    /// GET `url`, sending `If-None-Match` when a validator is known.
    ///
    /// Any status the server answers with is returned as `Ok`; only
    /// transport failures are errors.
    fn get(&self, url: &str, if_none_match: Option<&str>) -> Result<FetchResponse>;
}

/// Dependencies the router offers to providers at start.
pub trait StartContext {
    /// HTTP client for downloads routed through `dialer`.
    fn http_client(&self, detour: &str, dialer: &Arc<dyn Dialer>) -> Result<Arc<dyn HttpClient>>;
}

/// [`HttpClient`] backed by a `ureq` agent bound to one outbound.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    /// Build a client that egresses through `dialer`.
    pub fn new(dialer: &dyn Dialer) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        if let Some(url) = dialer.proxy_url() {
            let proxy = ureq::Proxy::new(&url)
                .map_err(|e| Error::Config(format!("outbound {}: {}", dialer.tag(), e)))?;
            builder = builder.proxy(proxy);
        }
        Ok(Self {
            agent: builder.build(),
        })
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str, if_none_match: Option<&str>) -> Result<FetchResponse> {
        let mut request = self.agent.get(url);
        if let Some(etag) = if_none_match {
            request = request.set(IF_NONE_MATCH, etag);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Ok(FetchResponse {
                    status,
                    etag: response.header("ETag").map(str::to_string),
                    body: Vec::new(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        let etag = response.header("ETag").map(str::to_string);
        let mut body = Vec::new();
        if status == STATUS_OK {
            response
                .into_reader()
                .read_to_end(&mut body)
                .map_err(|e| Error::Transport(e.to_string()))?;
        }

        Ok(FetchResponse { status, etag, body })
    }
}

/// Start context that keeps one client per detour tag.
#[derive(Default)]
pub struct SharedHttpClients {
    clients: Mutex<AHashMap<String, Arc<dyn HttpClient>>>,
}

impl SharedHttpClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct clients created so far.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StartContext for SharedHttpClients {
    fn http_client(&self, detour: &str, dialer: &Arc<dyn Dialer>) -> Result<Arc<dyn HttpClient>> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(detour) {
            return Ok(client.clone());
        }

        let client: Arc<dyn HttpClient> = Arc::new(UreqClient::new(dialer.as_ref())?);
        clients.insert(detour.to_string(), client.clone());
        Ok(client)
    }
}
