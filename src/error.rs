//! Error types for ruleset-provider.

use thiserror::Error;

/// Error type for rule-set operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid binary file magic bytes
    #[error("invalid magic bytes: expected SRS header")]
    InvalidMagic,

    /// Unsupported binary or source format version
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    /// Binary payload ended early or contains an unknown tag
    #[error("corrupt binary rule-set: {0}")]
    Corrupt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rule failed validation
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Invalid CIDR pattern
    #[error("invalid CIDR pattern: {0}")]
    InvalidCidr(String),

    /// Invalid domain regex
    #[error("invalid domain regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// download_detour names an outbound the router does not know
    #[error("download_detour not found: {0}")]
    DetourNotFound(String),

    /// Router has no default outbound for the network
    #[error("missing default outbound for network {0}")]
    NoDefaultOutbound(String),

    /// Server answered with a status other than 200 or 304
    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),

    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Backing file is older than the data last served
    #[error("backing file out of date: {0}")]
    StaleFile(String),

    /// The owning context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The rule-set was closed
    #[error("rule-set closed: {0}")]
    Closed(String),

    /// DecRef without a matching IncRef
    #[error("rule-set {0}: negative refs")]
    NegativeRefs(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the data itself was malformed.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic
                | Error::UnsupportedVersion(_)
                | Error::Corrupt(_)
                | Error::Json(_)
                | Error::InvalidRule(_)
                | Error::InvalidCidr(_)
                | Error::InvalidRegex(_)
        )
    }

    /// Whether this error came from the network side of a fetch.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::UnexpectedStatus(_) | Error::Transport(_))
    }

    /// Whether this error is a start-up configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DetourNotFound(_) | Error::NoDefaultOutbound(_) | Error::Config(_)
        )
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => Error::UnexpectedStatus(code),
            ureq::Error::Transport(t) => Error::Transport(t.to_string()),
        }
    }
}

/// Result type alias for rule-set operations.
pub type Result<T> = std::result::Result<T, Error>;
