//! Tests for the compiled rule-set format.

use super::*;
use crate::rule::{parse_cidr, DefaultRule, HeadlessRule, LogicalMode, LogicalRule};
use crate::source::SourceParser;
use crate::Error;

fn sample_rules() -> Vec<HeadlessRule> {
    SourceParser::parse(
        br#"{
            "version": 3,
            "rules": [
                {"domain": ["google.com", "www.google.com"], "domain_suffix": ".youtube.com"},
                {"domain_keyword": "ads", "domain_regex": "^track[0-9]+\\."},
                {"ip_cidr": ["10.0.0.0/8", "2001:db8::/32", "1.1.1.1"], "invert": true},
                {"source_ip_cidr": "192.168.0.0/16", "source_port": [1024, 65535], "port": 53},
                {"process_name": "curl", "process_path": "/usr/bin/wget", "package_name": "com.example.app"},
                {"network": ["tcp", "udp"]},
                {
                    "type": "logical",
                    "mode": "and",
                    "rules": [
                        {"domain_suffix": "example.com"},
                        {"type": "logical", "mode": "or", "rules": [{"port": 80}, {"port": 443}], "invert": true}
                    ]
                }
            ]
        }"#,
    )
    .unwrap()
}

fn encode(rules: &[HeadlessRule]) -> Vec<u8> {
    BinaryRuleWriter::new().write(rules).unwrap()
}

#[test]
fn test_roundtrip_preserves_rules_and_order() {
    let rules = sample_rules();
    let data = encode(&rules);

    assert!(is_binary(&data));
    assert_eq!(data[MAGIC.len()], FORMAT_VERSION);

    let decoded = BinaryRuleReader::decode(&data).unwrap();
    assert_eq!(decoded, rules);
}

#[test]
fn test_empty_rule_list() {
    let data = encode(&[]);
    assert!(BinaryRuleReader::decode(&data).unwrap().is_empty());
}

#[test]
fn test_host_bits_survive_roundtrip() {
    let rule = HeadlessRule::Default(DefaultRule {
        ip_cidr: vec![parse_cidr("10.1.2.3/8").unwrap()],
        ..Default::default()
    });

    let decoded = BinaryRuleReader::decode(&encode(&[rule.clone()])).unwrap();
    assert_eq!(decoded, vec![rule]);
}

#[test]
fn test_writer_is_reusable() {
    let mut writer = BinaryRuleWriter::new();
    let first = writer.write(&sample_rules()).unwrap();
    let second = writer.write(&sample_rules()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_invalid_magic() {
    let mut data = encode(&sample_rules());
    data[0] = b'X';
    assert!(matches!(
        BinaryRuleReader::decode(&data),
        Err(Error::InvalidMagic)
    ));
}

#[test]
fn test_source_document_is_not_binary() {
    let err = BinaryRuleReader::decode(br#"{"version": 1, "rules": []}"#).unwrap_err();
    assert!(matches!(err, Error::InvalidMagic));
}

#[test]
fn test_unsupported_version() {
    let mut data = encode(&sample_rules());
    data[MAGIC.len()] = FORMAT_VERSION + 1;
    assert!(matches!(
        BinaryRuleReader::decode(&data),
        Err(Error::UnsupportedVersion(2))
    ));
}

#[test]
fn test_too_small() {
    assert!(matches!(
        BinaryRuleReader::decode(b"SR"),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_truncated_stream() {
    let data = encode(&sample_rules());
    let truncated = &data[..data.len() / 2];
    let err = BinaryRuleReader::decode(truncated).unwrap_err();
    assert!(err.is_parse());
}

/// Compress a hand-built body behind a valid header.
fn with_header(body: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut out = Vec::from(MAGIC);
    out.push(FORMAT_VERSION);
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_unknown_rule_type() {
    let data = with_header(&[1, 9]);
    assert!(matches!(
        BinaryRuleReader::decode(&data),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_unknown_item_type() {
    let data = with_header(&[1, RULE_TYPE_DEFAULT, 99]);
    assert!(matches!(
        BinaryRuleReader::decode(&data),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_invalid_prefix_length() {
    // one default rule, ip_cidr with 10.0.0.0/40
    let body = [
        1,
        RULE_TYPE_DEFAULT,
        ItemType::IpCidr.as_u8(),
        1,
        4,
        10,
        0,
        0,
        0,
        40,
        ITEM_FINAL,
        0,
    ];
    assert!(matches!(
        BinaryRuleReader::decode(&with_header(&body)),
        Err(Error::InvalidCidr(_))
    ));
}

#[test]
fn test_empty_default_rule_rejected() {
    let body = [1, RULE_TYPE_DEFAULT, ITEM_FINAL, 0];
    assert!(matches!(
        BinaryRuleReader::decode(&with_header(&body)),
        Err(Error::InvalidRule(_))
    ));
}

#[test]
fn test_trailing_bytes_rejected() {
    let body = [0, 0xAA];
    assert!(BinaryRuleReader::decode(&with_header(&body)).is_err());
}

#[test]
fn test_huge_count_rejected_without_allocating() {
    let mut body = Vec::new();
    put_uvarint(&mut body, u64::MAX >> 1);
    assert!(matches!(
        BinaryRuleReader::decode(&with_header(&body)),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_deep_nesting_rejected() {
    let mut rule = HeadlessRule::Default(DefaultRule {
        port: vec![443],
        ..Default::default()
    });
    for _ in 0..40 {
        rule = HeadlessRule::Logical(LogicalRule {
            mode: LogicalMode::And,
            rules: vec![rule],
            invert: false,
        });
    }

    let data = encode(&[rule]);
    assert!(matches!(
        BinaryRuleReader::decode(&data),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn test_inflated_body_is_capped() {
    use std::io::Read;

    // compresses to a few bytes, inflates far past the limit
    let data = with_header(&vec![0u8; 1 << 20]);
    assert!(data.len() < 4096);

    match BinaryRuleReader::decode_limited(&data, 4096) {
        Err(Error::Corrupt(msg)) => assert!(msg.contains("exceeds 4096 bytes")),
        other => panic!("expected size error, got {:?}", other.map(|r| r.len())),
    }

    let rules = sample_rules();
    let exact = encode(&rules);
    let mut inflated = Vec::new();
    flate2::read::ZlibDecoder::new(&exact[HEADER_SIZE..])
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(
        BinaryRuleReader::decode_limited(&exact, inflated.len() as u64).unwrap(),
        rules
    );
}
