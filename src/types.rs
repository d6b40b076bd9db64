//! Core domain types shared across the scan pipeline.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Contract-native token identifier, distinct from the enumeration index.
pub type TokenId = u64;

/// 20-byte account identifier used as the ownership key.
///
/// Parses from a `0x`-prefixed hex string, case-insensitively. Equality and
/// hashing operate on the raw bytes, so two casings of the same address
/// always compare equal. Displays and serializes as lowercase hex, which
/// also makes it usable as a JSON map key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Abbreviated form for display, e.g. `0x123456...abcd`.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..8], &full[full.len() - 4..])
    }
}

/// Parse failure for [`Address`].
#[derive(Debug, thiserror::Error)]
#[error("invalid address `{0}`: expected 0x-prefixed 40-char hex string")]
pub struct InvalidAddress(String);

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| InvalidAddress(s.to_string()))?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// One resolved NFT.
///
/// Immutable once constructed: a later scan produces a wholly new value for
/// the same id if the on-chain state changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// On-chain token identifier.
    pub id: TokenId,
    /// Metadata location as reported by the contract.
    pub uri: String,
    /// Current owner.
    pub owner: Address,
    /// Image URI from the metadata document.
    pub image: String,
    /// Display name from the metadata document.
    pub name: String,
}
