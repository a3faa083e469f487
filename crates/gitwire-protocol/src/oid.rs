//! Object identifiers as they appear on the wire.

use crate::{ProtocolError, Result};
use std::fmt;
use std::str::FromStr;

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 40;

    /// The all-zero id, used for "no object" in reference updates.
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Creates an ObjectId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != Self::HEX_LEN {
            return Err(ProtocolError::InvalidObjectId(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| ProtocolError::InvalidObjectId(format!("{hex}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Parses the hex id at the start of `bytes`.
    pub(crate) fn from_hex_prefix(bytes: &[u8]) -> Result<Self> {
        let prefix = bytes.get(..Self::HEX_LEN).ok_or_else(|| {
            ProtocolError::InvalidObjectId(String::from_utf8_lossy(bytes).into_owned())
        })?;
        let hex = std::str::from_utf8(prefix)
            .map_err(|_| ProtocolError::InvalidObjectId("non-ascii object id".to_string()))?;
        Self::from_hex(hex)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns true for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl FromStr for ObjectId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "3f786850e387550fdab836ed7e6dc881de23001b";

    #[test]
    fn test_hex_roundtrip() {
        let id = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(id.to_hex(), HEX);
        assert_eq!(id.to_string(), HEX);
        assert_eq!(HEX.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_zero() {
        assert!(ObjectId::zero().is_zero());
        assert_eq!(ObjectId::zero().to_hex(), "0".repeat(40));
        assert!(!ObjectId::from_hex(HEX).unwrap().is_zero());
    }

    #[test]
    fn test_invalid_length() {
        assert!(ObjectId::from_hex("abc").is_err());
    }

    #[test]
    fn test_invalid_hex() {
        assert!(ObjectId::from_hex(&"z".repeat(40)).is_err());
    }

    #[test]
    fn test_prefix() {
        let line = format!("{HEX} refs/heads/main");
        let id = ObjectId::from_hex_prefix(line.as_bytes()).unwrap();
        assert_eq!(id.to_hex(), HEX);
        assert!(ObjectId::from_hex_prefix(b"short").is_err());
    }
}
