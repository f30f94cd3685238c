//! Chain data model shared by the ledger, the stores and the peer gateway.

pub mod asset;
pub mod codec;
pub mod hash;
pub mod merkle_block;
pub mod peer;
pub mod transaction;

pub use asset::{Asset, AssetType};
pub use codec::{ByteReader, ByteWriter, CodecError, Decodable, Encodable};
pub use hash::{Address, Uint168, Uint256, sha256d};
pub use merkle_block::MerkleBlock;
pub use peer::PeerInfo;
pub use transaction::{
    OutPoint, OutputType, RegisterAssetPayload, TX_UNCONFIRMED, Transaction, TransactionInput,
    TransactionOutput, TxPayload,
};
