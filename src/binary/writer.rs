//! Binary rule-set writer.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use ipnet::IpNet;
use std::io::Write;

use super::format::*;
use crate::rule::{DefaultRule, HeadlessRule, LogicalRule};
use crate::Result;

/// Binary rule-set writer.
pub struct BinaryRuleWriter {
    buffer: Vec<u8>,
}

impl BinaryRuleWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Encode rules into the compiled format.
    pub fn write(&mut self, rules: &[HeadlessRule]) -> Result<Vec<u8>> {
        self.buffer.clear();

        put_uvarint(&mut self.buffer, rules.len() as u64);
        for rule in rules {
            self.write_rule(rule);
        }

        let mut output = Vec::with_capacity(HEADER_SIZE + self.buffer.len() / 2);
        output.extend_from_slice(&MAGIC);
        output.push(FORMAT_VERSION);

        let mut encoder = ZlibEncoder::new(output, Compression::best());
        encoder.write_all(&self.buffer)?;
        let output = encoder.finish()?;

        self.buffer.clear();
        Ok(output)
    }

    fn write_rule(&mut self, rule: &HeadlessRule) {
        match rule {
            HeadlessRule::Default(rule) => {
                self.buffer.push(RULE_TYPE_DEFAULT);
                self.write_default(rule);
            }
            HeadlessRule::Logical(rule) => {
                self.buffer.push(RULE_TYPE_LOGICAL);
                self.write_logical(rule);
            }
        }
    }

    fn write_default(&mut self, rule: &DefaultRule) {
        self.write_strings(ItemType::Domain, &rule.domain);
        self.write_strings(ItemType::DomainSuffix, &rule.domain_suffix);
        self.write_strings(ItemType::DomainKeyword, &rule.domain_keyword);
        self.write_strings(ItemType::DomainRegex, &rule.domain_regex);
        self.write_cidrs(ItemType::SourceIpCidr, &rule.source_ip_cidr);
        self.write_cidrs(ItemType::IpCidr, &rule.ip_cidr);
        self.write_ports(ItemType::SourcePort, &rule.source_port);
        self.write_ports(ItemType::Port, &rule.port);
        self.write_strings(ItemType::ProcessName, &rule.process_name);
        self.write_strings(ItemType::ProcessPath, &rule.process_path);
        self.write_strings(ItemType::PackageName, &rule.package_name);
        self.write_strings(ItemType::Network, &rule.network);

        self.buffer.push(ITEM_FINAL);
        self.buffer.push(rule.invert as u8);
    }

    fn write_logical(&mut self, rule: &LogicalRule) {
        self.buffer.push(rule.mode.as_u8());
        put_uvarint(&mut self.buffer, rule.rules.len() as u64);
        for sub in &rule.rules {
            self.write_rule(sub);
        }
        self.buffer.push(rule.invert as u8);
    }

    fn write_strings(&mut self, item: ItemType, values: &[String]) {
        if values.is_empty() {
            return;
        }
        self.buffer.push(item.as_u8());
        put_uvarint(&mut self.buffer, values.len() as u64);
        for value in values {
            put_uvarint(&mut self.buffer, value.len() as u64);
            self.buffer.extend_from_slice(value.as_bytes());
        }
    }

    fn write_cidrs(&mut self, item: ItemType, nets: &[IpNet]) {
        if nets.is_empty() {
            return;
        }
        self.buffer.push(item.as_u8());
        put_uvarint(&mut self.buffer, nets.len() as u64);
        for net in nets {
            match net {
                IpNet::V4(v4) => {
                    self.buffer.push(4);
                    self.buffer.extend_from_slice(&v4.addr().octets());
                }
                IpNet::V6(v6) => {
                    self.buffer.push(16);
                    self.buffer.extend_from_slice(&v6.addr().octets());
                }
            }
            self.buffer.push(net.prefix_len());
        }
    }

    fn write_ports(&mut self, item: ItemType, ports: &[u16]) {
        if ports.is_empty() {
            return;
        }
        self.buffer.push(item.as_u8());
        put_uvarint(&mut self.buffer, ports.len() as u64);
        for port in ports {
            self.buffer.extend_from_slice(&port.to_be_bytes());
        }
    }
}

impl Default for BinaryRuleWriter {
    fn default() -> Self {
        Self::new()
    }
}
