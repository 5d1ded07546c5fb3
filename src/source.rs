//! Source (JSON) rule-set format.
//!
//! ```json
//! {
//!   "version": 3,
//!   "rules": [
//!     { "domain_suffix": ["google.com", "youtube.com"] },
//!     { "ip_cidr": "8.8.8.0/24" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::rule::HeadlessRule;
use crate::{Error, Result};

/// Newest source format version understood by this crate.
pub const SOURCE_VERSION: u8 = 3;

/// Top-level JSON document of a source rule-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub version: u8,
    #[serde(default)]
    pub rules: Vec<HeadlessRule>,
}

/// Source format parser.
pub struct SourceParser;

impl SourceParser {
    /// Parse and validate a source document.
    pub fn parse(data: &[u8]) -> Result<Vec<HeadlessRule>> {
        let document: SourceDocument = serde_json::from_slice(data)?;

        if document.version == 0 || document.version > SOURCE_VERSION {
            return Err(Error::UnsupportedVersion(document.version as u32));
        }

        for (index, rule) in document.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| Error::InvalidRule(format!("rules[{}]: {}", index, e)))?;
        }

        Ok(document.rules)
    }
}

/// Source format writer.
pub struct SourceWriter;

impl SourceWriter {
    /// Serialize rules as a pretty-printed source document.
    pub fn write(rules: &[HeadlessRule]) -> Result<Vec<u8>> {
        let document = SourceDocument {
            version: SOURCE_VERSION,
            rules: rules.to_vec(),
        };
        let mut data = serde_json::to_vec_pretty(&document)?;
        data.push(b'\n');
        Ok(data)
    }
}
