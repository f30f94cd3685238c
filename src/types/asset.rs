use crate::types::codec::{ByteReader, ByteWriter, CodecError, Decodable, Encodable};
use crate::types::hash::{Uint256, sha256d};
use serde::{Deserialize, Serialize};

/// Kind of fungible unit an asset describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Token,
    Share,
}

impl AssetType {
    fn to_byte(self) -> u8 {
        match self {
            AssetType::Token => 0x00,
            AssetType::Share => 0x01,
        }
    }

    fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0x00 => Ok(AssetType::Token),
            0x01 => Ok(AssetType::Share),
            other => Err(CodecError::InvalidValue(format!("unknown asset type {:#04x}", other))),
        }
    }
}

/// A distinguishable fungible unit tracked independently for balance purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub description: String,
    pub precision: u8,
    pub asset_type: AssetType,
}

/// Symbol of the chain's native asset.
pub const NATIVE_ASSET_NAME: &str = "ELA";
/// Decimal places of the native asset.
pub const NATIVE_ASSET_PRECISION: u8 = 8;

impl Asset {
    pub fn new(name: impl Into<String>, description: impl Into<String>, precision: u8) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            precision,
            asset_type: AssetType::Token,
        }
    }

    /// The native asset every ledger installs at construction.
    pub fn native() -> Self {
        Self::new(NATIVE_ASSET_NAME, "", NATIVE_ASSET_PRECISION)
    }

    /// Asset id: double SHA-256 of the canonical encoding.
    pub fn id(&self) -> Uint256 {
        sha256d(&self.to_bytes())
    }

    pub fn native_id() -> Uint256 {
        Self::native().id()
    }
}

impl Encodable for Asset {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.put_var_string(&self.name);
        writer.put_var_string(&self.description);
        writer.put_u8(self.precision);
        writer.put_u8(self.asset_type.to_byte());
    }
}

impl Decodable for Asset {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.get_var_string()?,
            description: reader.get_var_string()?,
            precision: reader.get_u8()?,
            asset_type: AssetType::from_byte(reader.get_u8()?)?,
        })
    }
}
