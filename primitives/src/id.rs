use std::{fmt, str::FromStr};

use alloy_primitives::{hex, B256};

/// A block or transaction hash.
///
/// Always `0x`-prefixed, 32 bytes, lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash(String);

/// Identifies a block either by number or by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockId {
    Number(u64),
    Hash(Hash),
}

/// Returned when parsing a malformed block or transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier;

impl error_stack::Context for InvalidIdentifier {}

impl fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid identifier")
    }
}

impl Hash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Hash {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with("0x") {
            return Err(InvalidIdentifier);
        }

        let bytes = B256::from_str(s).map_err(|_| InvalidIdentifier)?;
        Ok(Hash::from(bytes))
    }
}

impl From<B256> for Hash {
    fn from(bytes: B256) -> Self {
        Hash(hex::encode_prefixed(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for BlockId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(BlockId::Number)
                .map_err(|_| InvalidIdentifier);
        }

        s.parse::<Hash>().map(BlockId::Hash)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Number(number) => write!(f, "{number}"),
            BlockId::Hash(hash) => write!(f, "{hash}"),
        }
    }
}

impl From<u64> for BlockId {
    fn from(number: u64) -> Self {
        BlockId::Number(number)
    }
}

impl From<Hash> for BlockId {
    fn from(hash: Hash) -> Self {
        BlockId::Hash(hash)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    #[test]
    fn test_parse_hash() {
        let hash = HASH.parse::<Hash>().unwrap();
        assert_eq!(hash.as_str(), HASH);

        let upper = format!("0x{}", HASH[2..].to_ascii_uppercase());
        let hash = upper.parse::<Hash>().unwrap();
        assert_eq!(hash.as_str(), HASH);
    }

    #[test]
    fn test_parse_hash_rejects_malformed() {
        assert!("".parse::<Hash>().is_err());
        assert!(HASH[2..].parse::<Hash>().is_err());
        assert!(HASH[..HASH.len() - 1].parse::<Hash>().is_err());
        assert!(format!("{}zz", &HASH[..HASH.len() - 2])
            .parse::<Hash>()
            .is_err());
        assert!(format!("{HASH}00").parse::<Hash>().is_err());
        assert!("0x".parse::<Hash>().is_err());
    }

    #[test]
    fn test_hash_from_bytes() {
        let bytes = B256::repeat_byte(0xab);
        let hash = Hash::from(bytes);
        assert_eq!(hash.as_str(), format!("0x{}", "ab".repeat(32)));
        assert_eq!(hash.as_str().parse::<Hash>().unwrap(), hash);
    }

    #[test]
    fn test_parse_block_id() {
        assert_matches!("100".parse::<BlockId>(), Ok(BlockId::Number(100)));
        assert_matches!("0".parse::<BlockId>(), Ok(BlockId::Number(0)));
        assert_matches!(HASH.parse::<BlockId>(), Ok(BlockId::Hash(_)));
        assert_matches!("-1".parse::<BlockId>(), Err(InvalidIdentifier));
        assert_matches!("0x12".parse::<BlockId>(), Err(InvalidIdentifier));
        assert_matches!("".parse::<BlockId>(), Err(InvalidIdentifier));
        assert_matches!(
            "99999999999999999999999".parse::<BlockId>(),
            Err(InvalidIdentifier)
        );
    }
}
