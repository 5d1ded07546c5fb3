//! Compiled (binary) rule-set format.
//!
//! # File Structure
//!
//! ```text
//! +------------------+
//! |  MAGIC "SRS"     |  3 bytes
//! +------------------+
//! |  VERSION         |  1 byte
//! +------------------+
//! |  ZLIB STREAM     |  variable
//! |   uvarint count  |
//! |   rule 0..count  |
//! +------------------+
//! ```
//!
//! A default rule is a run of `item type, payload` pairs closed by
//! `0xFF` and an invert byte. A logical rule is a mode byte, a uvarint
//! sub-rule count, the sub-rules, and an invert byte.

mod format;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use format::*;
pub use reader::BinaryRuleReader;
pub use writer::BinaryRuleWriter;
