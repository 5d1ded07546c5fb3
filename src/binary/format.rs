//! Binary format constants and primitive encodings.

/// Magic bytes for identifying compiled rule-set files.
pub const MAGIC: [u8; 3] = *b"SRS";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Header size in bytes (magic + version).
pub const HEADER_SIZE: usize = MAGIC.len() + 1;

/// Rule tag for a default rule.
pub const RULE_TYPE_DEFAULT: u8 = 0;

/// Rule tag for a logical rule.
pub const RULE_TYPE_LOGICAL: u8 = 1;

/// Terminates the item list of a default rule.
pub const ITEM_FINAL: u8 = 0xFF;

/// Item kinds inside a default rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Domain,
    DomainSuffix,
    DomainKeyword,
    DomainRegex,
    SourceIpCidr,
    IpCidr,
    SourcePort,
    Port,
    ProcessName,
    ProcessPath,
    PackageName,
    Network,
}

impl ItemType {
    /// Convert to a u8 value for binary serialization.
    pub fn as_u8(&self) -> u8 {
        match self {
            ItemType::Domain => 2,
            ItemType::DomainSuffix => 3,
            ItemType::DomainKeyword => 4,
            ItemType::DomainRegex => 5,
            ItemType::SourceIpCidr => 6,
            ItemType::IpCidr => 7,
            ItemType::SourcePort => 8,
            ItemType::Port => 9,
            ItemType::ProcessName => 10,
            ItemType::ProcessPath => 11,
            ItemType::PackageName => 12,
            ItemType::Network => 13,
        }
    }

    /// Convert from a u8 value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            2 => Some(ItemType::Domain),
            3 => Some(ItemType::DomainSuffix),
            4 => Some(ItemType::DomainKeyword),
            5 => Some(ItemType::DomainRegex),
            6 => Some(ItemType::SourceIpCidr),
            7 => Some(ItemType::IpCidr),
            8 => Some(ItemType::SourcePort),
            9 => Some(ItemType::Port),
            10 => Some(ItemType::ProcessName),
            11 => Some(ItemType::ProcessPath),
            12 => Some(ItemType::PackageName),
            13 => Some(ItemType::Network),
            _ => None,
        }
    }
}

/// Append `value` as an unsigned LEB128 varint.
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Check if data starts with the compiled rule-set magic.
pub fn is_binary(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && data[..MAGIC.len()] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_roundtrip() {
        for v in 2..=13 {
            let item = ItemType::from_u8(v).unwrap();
            assert_eq!(item.as_u8(), v);
        }
        assert_eq!(ItemType::from_u8(0), None);
        assert_eq!(ItemType::from_u8(ITEM_FINAL), None);
    }

    #[test]
    fn test_put_uvarint() {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, 0);
        put_uvarint(&mut buf, 127);
        put_uvarint(&mut buf, 300);
        assert_eq!(buf, vec![0x00, 0x7f, 0xac, 0x02]);
    }

    #[test]
    fn test_is_binary() {
        assert!(is_binary(b"SRS\x01rest"));
        assert!(!is_binary(b"{\"version\": 1}"));
        assert!(!is_binary(b"SR"));
    }
}
