//! Egress resolution consumed from the router.
//!
//! Rule-set providers never dial on their own: they ask the router for an
//! outbound by tag (or the default one) and hand it to the HTTP layer.

use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Transport family used when asking for a default outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    /// Lowercase name of the network.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An egress path the router can hand out.
pub trait Dialer: Send + Sync {
    /// Outbound tag.
    fn tag(&self) -> &str;

    /// Proxy URL (`http://`, `socks5://`) that tunnels through this outbound.
    ///
    /// `None` means connections go out directly.
    fn proxy_url(&self) -> Option<String> {
        None
    }
}

/// Router lookup surface used at provider start.
pub trait Router: Send + Sync {
    /// Find an outbound by tag.
    fn outbound(&self, tag: &str) -> Option<Arc<dyn Dialer>>;

    /// Default outbound for a transport family.
    fn default_outbound(&self, network: Network) -> Result<Arc<dyn Dialer>>;
}

/// Outbound that connects directly.
#[derive(Debug, Clone)]
pub struct DirectDialer {
    tag: String,
}

impl DirectDialer {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Default for DirectDialer {
    fn default() -> Self {
        Self::new("direct")
    }
}

impl Dialer for DirectDialer {
    fn tag(&self) -> &str {
        &self.tag
    }
}

/// Outbound reached through an upstream proxy.
#[derive(Debug, Clone)]
pub struct ProxyDialer {
    tag: String,
    url: String,
}

impl ProxyDialer {
    pub fn new(tag: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
        }
    }
}

impl Dialer for ProxyDialer {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn proxy_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display() {
        assert_eq!(Network::Tcp.to_string(), "tcp");
        assert_eq!(Network::Udp.as_str(), "udp");
    }

    #[test]
    fn test_dialers() {
        let direct = DirectDialer::default();
        assert_eq!(direct.tag(), "direct");
        assert!(direct.proxy_url().is_none());

        let proxy = ProxyDialer::new("hk", "socks5://127.0.0.1:1080");
        assert_eq!(proxy.tag(), "hk");
        assert_eq!(proxy.proxy_url().as_deref(), Some("socks5://127.0.0.1:1080"));
    }
}
