use crate::types::codec::{ByteReader, ByteWriter, CodecError, Decodable, Encodable};
use crate::types::hash::{Uint256, sha256d};
use serde::{Deserialize, Serialize};

/// Block header plus the partial merkle tree proving which transactions it contains.
///
/// The proof has already been verified by the peer gateway; the ledger only needs the header
/// fields and the height, which travels next to the encoding rather than inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBlock {
    pub version: u32,
    pub prev_block: Uint256,
    pub merkle_root: Uint256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub total_transactions: u32,
    pub hashes: Vec<Uint256>,
    pub flags: Vec<u8>,
    #[serde(default)]
    pub height: u32,
}

impl MerkleBlock {
    pub const HEADER_SIZE: usize = 80;

    fn encode_header(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.version);
        writer.put_uint256(&self.prev_block);
        writer.put_uint256(&self.merkle_root);
        writer.put_u32(self.timestamp);
        writer.put_u32(self.bits);
        writer.put_u32(self.nonce);
    }

    /// Double SHA-256 of the 80-byte header.
    pub fn hash(&self) -> Uint256 {
        let mut writer = ByteWriter::new();
        self.encode_header(&mut writer);
        sha256d(&writer.into_inner())
    }

    /// Decode a persisted block and attach the height stored beside it.
    pub fn from_record(bytes: &[u8], height: u32) -> Result<Self, CodecError> {
        let mut block = Self::from_bytes(bytes)?;
        block.height = height;
        Ok(block)
    }
}

impl Encodable for MerkleBlock {
    fn encode(&self, writer: &mut ByteWriter) {
        self.encode_header(writer);
        writer.put_u32(self.total_transactions);
        writer.put_var_uint(self.hashes.len() as u64);
        for hash in &self.hashes {
            writer.put_uint256(hash);
        }
        writer.put_var_bytes(&self.flags);
    }
}

impl Decodable for MerkleBlock {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let version = reader.get_u32()?;
        let prev_block = reader.get_uint256()?;
        let merkle_root = reader.get_uint256()?;
        let timestamp = reader.get_u32()?;
        let bits = reader.get_u32()?;
        let nonce = reader.get_u32()?;
        let total_transactions = reader.get_u32()?;

        let count = reader.get_var_len(32)?;
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            hashes.push(reader.get_uint256()?);
        }
        let flags = reader.get_var_bytes()?;

        Ok(Self {
            version,
            prev_block,
            merkle_root,
            timestamp,
            bits,
            nonce,
            total_transactions,
            hashes,
            flags,
            height: 0,
        })
    }
}
