//! Binary rule-set reader.

use flate2::read::ZlibDecoder;
use ipnet::IpNet;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::format::*;
use crate::rule::{DefaultRule, HeadlessRule, LogicalMode, LogicalRule};
use crate::{Error, Result};

/// Nesting limit for logical rules.
const MAX_DEPTH: usize = 32;

/// Upper bound on the inflated rule stream.
pub const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Binary rule-set reader.
pub struct BinaryRuleReader;

impl BinaryRuleReader {
    /// Decode and validate a compiled rule-set.
    pub fn decode(data: &[u8]) -> Result<Vec<HeadlessRule>> {
        Self::decode_limited(data, MAX_BODY_SIZE)
    }

    pub(super) fn decode_limited(data: &[u8], max_body: u64) -> Result<Vec<HeadlessRule>> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corrupt(format!(
                "file too small: {} bytes",
                data.len()
            )));
        }

        if !is_binary(data) {
            return Err(Error::InvalidMagic);
        }

        let version = data[MAGIC.len()];
        if version == 0 || version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version as u32));
        }

        let mut body = Vec::new();
        ZlibDecoder::new(&data[HEADER_SIZE..])
            .take(max_body + 1)
            .read_to_end(&mut body)
            .map_err(|e| Error::Corrupt(format!("zlib: {}", e)))?;
        if body.len() as u64 > max_body {
            return Err(Error::Corrupt(format!(
                "inflated body exceeds {} bytes",
                max_body
            )));
        }

        let mut cursor = Cursor::new(&body);
        let count = cursor.read_count()?;
        let mut rules = Vec::with_capacity(count);
        for _ in 0..count {
            rules.push(cursor.read_rule(0)?);
        }

        if !cursor.is_empty() {
            return Err(Error::Corrupt("trailing bytes after last rule".to_string()));
        }

        for rule in &rules {
            rule.validate()?;
        }

        Ok(rules)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Corrupt("unexpected end of data".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::Corrupt("unexpected end of data".to_string()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_uvarint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::Corrupt("varint overflow".to_string()))
    }

    /// Read an element count, bounded by the remaining input.
    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_uvarint()?;
        let remaining = (self.data.len() - self.pos) as u64;
        if count > remaining {
            return Err(Error::Corrupt(format!(
                "count {} exceeds remaining {} bytes",
                count, remaining
            )));
        }
        Ok(count as usize)
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Corrupt(format!("invalid bool: {}", other))),
        }
    }

    fn read_rule(&mut self, depth: usize) -> Result<HeadlessRule> {
        if depth > MAX_DEPTH {
            return Err(Error::Corrupt("logical rules nested too deep".to_string()));
        }

        match self.read_u8()? {
            RULE_TYPE_DEFAULT => self.read_default().map(HeadlessRule::Default),
            RULE_TYPE_LOGICAL => self.read_logical(depth).map(HeadlessRule::Logical),
            other => Err(Error::Corrupt(format!("unknown rule type: {}", other))),
        }
    }

    fn read_default(&mut self) -> Result<DefaultRule> {
        let mut rule = DefaultRule::default();

        loop {
            let tag = self.read_u8()?;
            if tag == ITEM_FINAL {
                rule.invert = self.read_bool()?;
                return Ok(rule);
            }

            let item = ItemType::from_u8(tag)
                .ok_or_else(|| Error::Corrupt(format!("unknown item type: {}", tag)))?;

            match item {
                ItemType::Domain => rule.domain.extend(self.read_strings()?),
                ItemType::DomainSuffix => rule.domain_suffix.extend(self.read_strings()?),
                ItemType::DomainKeyword => rule.domain_keyword.extend(self.read_strings()?),
                ItemType::DomainRegex => rule.domain_regex.extend(self.read_strings()?),
                ItemType::SourceIpCidr => rule.source_ip_cidr.extend(self.read_cidrs()?),
                ItemType::IpCidr => rule.ip_cidr.extend(self.read_cidrs()?),
                ItemType::SourcePort => rule.source_port.extend(self.read_ports()?),
                ItemType::Port => rule.port.extend(self.read_ports()?),
                ItemType::ProcessName => rule.process_name.extend(self.read_strings()?),
                ItemType::ProcessPath => rule.process_path.extend(self.read_strings()?),
                ItemType::PackageName => rule.package_name.extend(self.read_strings()?),
                ItemType::Network => rule.network.extend(self.read_strings()?),
            }
        }
    }

    fn read_logical(&mut self, depth: usize) -> Result<LogicalRule> {
        let mode = self.read_u8()?;
        let mode = LogicalMode::from_u8(mode)
            .ok_or_else(|| Error::Corrupt(format!("unknown logical mode: {}", mode)))?;

        let count = self.read_count()?;
        let mut rules = Vec::with_capacity(count);
        for _ in 0..count {
            rules.push(self.read_rule(depth + 1)?);
        }

        let invert = self.read_bool()?;
        Ok(LogicalRule {
            mode,
            rules,
            invert,
        })
    }

    fn read_strings(&mut self) -> Result<Vec<String>> {
        let count = self.read_count()?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.read_count()?;
            let bytes = self.read_bytes(len)?;
            let value = std::str::from_utf8(bytes)
                .map_err(|e| Error::Corrupt(format!("invalid UTF-8: {}", e)))?;
            values.push(value.to_string());
        }
        Ok(values)
    }

    fn read_cidrs(&mut self) -> Result<Vec<IpNet>> {
        let count = self.read_count()?;
        let mut nets = Vec::with_capacity(count);
        for _ in 0..count {
            let family = self.read_u8()?;
            let addr = match family {
                4 => {
                    let b = self.read_bytes(4)?;
                    IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
                }
                16 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(self.read_bytes(16)?);
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
                other => {
                    return Err(Error::Corrupt(format!("invalid address length: {}", other)))
                }
            };
            let prefix_len = self.read_u8()?;
            let net = IpNet::new(addr, prefix_len)
                .map_err(|_| Error::InvalidCidr(format!("{}/{}", addr, prefix_len)))?;
            nets.push(net);
        }
        Ok(nets)
    }

    fn read_ports(&mut self) -> Result<Vec<u16>> {
        let count = self.read_count()?;
        let mut ports = Vec::with_capacity(count);
        for _ in 0..count {
            let b = self.read_bytes(2)?;
            ports.push(u16::from_be_bytes([b[0], b[1]]));
        }
        Ok(ports)
    }
}
