//! Fixed-width hash values used as transaction ids, asset ids and program hashes.

use crate::types::codec::CodecError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit hash (transaction hash, asset id, block hash).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Uint256(pub [u8; 32]);

/// 168-bit program hash. The first byte is the address prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Uint168(pub [u8; 21]);

/// Receiving addresses are identified by their program hash.
pub type Address = Uint168;

/// Prefix byte of a standard single-signature program hash.
pub const PREFIX_STANDARD: u8 = 0x21;
/// Prefix byte of a deposit (vote/owner) program hash.
pub const PREFIX_DEPOSIT: u8 = 0x1F;

impl Uint256 {
    pub const ZERO: Uint256 = Uint256([0u8; 32]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: 32,
            found: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Uint168 {
    pub const ZERO: Uint168 = Uint168([0u8; 21]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 21] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: 21,
            found: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build a program hash from a prefix byte and a 160-bit key hash.
    pub fn with_prefix(prefix: u8, key_hash: &[u8; 20]) -> Self {
        let mut arr = [0u8; 21];
        arr[0] = prefix;
        arr[1..].copy_from_slice(key_hash);
        Self(arr)
    }

    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 21]
    }
}

impl fmt::Display for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uint256({})", self.to_hex())
    }
}

impl fmt::Display for Uint168 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Uint168 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uint168({})", self.to_hex())
    }
}

impl From<Uint256> for String {
    fn from(value: Uint256) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Uint256 {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uint256::from_hex(&value)
    }
}

impl From<Uint168> for String {
    fn from(value: Uint168) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Uint168 {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uint168::from_hex(&value)
    }
}

/// Double SHA-256, the content hash used for transactions, assets and block headers.
pub fn sha256d(data: &[u8]) -> Uint256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    Uint256(out)
}

/// Single SHA-256 truncated to 160 bits.
pub fn sha256_160(data: &[u8]) -> [u8; 20] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let hash = Uint256(bytes);
        let parsed = Uint256::from_hex(&hash.to_hex()).expect("valid hex");
        assert_eq!(parsed, hash);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Uint168::from_hex("abcd").unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidLength {
                expected: 21,
                found: 2
            }
        ));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let addr = Uint168::with_prefix(PREFIX_STANDARD, &[7u8; 20]);
        let json = serde_json::to_string(&addr).expect("serialize");
        assert_eq!(json, format!("\"21{}\"", "07".repeat(20)));
        let back: Uint168 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, addr);
    }

    #[test]
    fn sha256d_is_stable() {
        // Double SHA-256 of the empty string.
        assert_eq!(
            sha256d(b"").to_hex(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
