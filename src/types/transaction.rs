//! Transaction data model and its canonical encoding.
//!
//! A transaction is identified by the double SHA-256 of its encoding. Block height, timestamp
//! and remark are local bookkeeping and never part of the encoding, so they can change after
//! confirmation without changing the hash.

use crate::types::asset::Asset;
use crate::types::codec::{ByteReader, ByteWriter, CodecError, Decodable, Encodable};
use crate::types::hash::{Address, Uint168, Uint256, sha256d};
use serde::{Deserialize, Serialize};

/// Block height sentinel carried by every unconfirmed transaction.
pub const TX_UNCONFIRMED: u32 = i32::MAX as u32;

/// Encoding version written ahead of every transaction.
pub const TX_VERSION: u8 = 0x09;

/// Outputs one transaction may carry; an outpoint addresses them with a `u16`.
pub const MAX_OUTPUTS: usize = u16::MAX as usize + 1;

/// Reference to an output of a prior transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: Uint256,
    pub index: u16,
}

impl OutPoint {
    pub fn new(tx_hash: Uint256, index: u16) -> Self {
        Self { tx_hash, index }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub previous: OutPoint,
    pub sequence: u32,
}

impl TransactionInput {
    pub fn new(tx_hash: Uint256, index: u16) -> Self {
        Self {
            previous: OutPoint::new(tx_hash, index),
            sequence: u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    #[default]
    Default,
    /// Output locked in a vote; counted in the voted balance.
    Vote,
}

impl OutputType {
    fn to_byte(self) -> u8 {
        match self {
            OutputType::Default => 0x00,
            OutputType::Vote => 0x01,
        }
    }

    fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0x00 => Ok(OutputType::Default),
            0x01 => Ok(OutputType::Vote),
            other => Err(CodecError::InvalidValue(format!("unknown output type {:#04x}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub asset_id: Uint256,
    pub amount: u64,
    pub output_lock: u32,
    pub program_hash: Uint168,
    #[serde(default)]
    pub output_type: OutputType,
}

impl TransactionOutput {
    /// Size of the fixed output record: asset id, amount, output lock, program hash.
    pub const SERIALIZED_SIZE: usize = 32 + 8 + 4 + 21;

    pub fn new(asset_id: Uint256, amount: u64, program_hash: Uint168) -> Self {
        Self {
            asset_id,
            amount,
            output_lock: 0,
            program_hash,
            output_type: OutputType::Default,
        }
    }

    pub fn address(&self) -> &Address {
        &self.program_hash
    }
}

impl Encodable for TransactionOutput {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.put_uint256(&self.asset_id);
        writer.put_u64(self.amount);
        writer.put_u32(self.output_lock);
        writer.put_uint168(&self.program_hash);
    }
}

impl Decodable for TransactionOutput {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            asset_id: reader.get_uint256()?,
            amount: reader.get_u64()?,
            output_lock: reader.get_u32()?,
            program_hash: reader.get_uint168()?,
            output_type: OutputType::Default,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAssetPayload {
    pub asset: Asset,
    pub amount: u64,
    pub controller: Uint168,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Block reward; outputs mature separately from ordinary outputs.
    CoinBase { data: Vec<u8> },
    RegisterAsset(RegisterAssetPayload),
    TransferAsset,
}

impl TxPayload {
    fn type_byte(&self) -> u8 {
        match self {
            TxPayload::CoinBase { .. } => 0x00,
            TxPayload::RegisterAsset(_) => 0x01,
            TxPayload::TransferAsset => 0x02,
        }
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer.put_u8(self.type_byte());
        match self {
            TxPayload::CoinBase { data } => writer.put_var_bytes(data),
            TxPayload::RegisterAsset(p) => {
                p.asset.encode(writer);
                writer.put_u64(p.amount);
                writer.put_uint168(&p.controller);
            }
            TxPayload::TransferAsset => {}
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match reader.get_u8()? {
            0x00 => Ok(TxPayload::CoinBase {
                data: reader.get_var_bytes()?,
            }),
            0x01 => Ok(TxPayload::RegisterAsset(RegisterAssetPayload {
                asset: Asset::decode(reader)?,
                amount: reader.get_u64()?,
                controller: reader.get_uint168()?,
            })),
            0x02 => Ok(TxPayload::TransferAsset),
            other => Err(CodecError::InvalidValue(format!(
                "unknown transaction type {:#04x}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    hash: Uint256,
    payload: TxPayload,
    memo: String,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
    lock_time: u32,
    block_height: u32,
    timestamp: u64,
    remark: String,
}

impl Transaction {
    /// Create an unconfirmed transaction and compute its hash.
    pub fn new(
        payload: TxPayload,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
        memo: impl Into<String>,
    ) -> Self {
        let mut tx = Self {
            hash: Uint256::ZERO,
            payload,
            memo: memo.into(),
            inputs,
            outputs,
            lock_time,
            block_height: TX_UNCONFIRMED,
            timestamp: 0,
            remark: String::new(),
        };
        tx.hash = sha256d(&tx.to_bytes());
        tx
    }

    /// Same transaction, stamped with a confirmation height and time.
    pub fn with_block(mut self, block_height: u32, timestamp: u64) -> Self {
        self.block_height = block_height;
        self.timestamp = timestamp;
        self
    }

    pub fn hash(&self) -> Uint256 {
        self.hash
    }

    pub fn payload(&self) -> &TxPayload {
        &self.payload
    }

    pub fn is_coin_base(&self) -> bool {
        matches!(self.payload, TxPayload::CoinBase { .. })
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn set_block_height(&mut self, height: u32) {
        self.block_height = height;
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn remark(&self) -> &str {
        &self.remark
    }

    pub fn set_remark(&mut self, remark: impl Into<String>) {
        self.remark = remark.into();
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_height != TX_UNCONFIRMED
    }

    /// Asset of the first output, or the native asset for output-less transactions.
    pub fn asset_id(&self) -> Uint256 {
        self.outputs
            .first()
            .map(|o| o.asset_id)
            .unwrap_or_else(Asset::native_id)
    }

    pub fn serialized_size(&self) -> usize {
        self.to_bytes().len()
    }

    /// Whether any input of this transaction spends an output of `parent`.
    pub fn spends_from(&self, parent: &Uint256) -> bool {
        self.inputs.iter().any(|i| i.previous.tx_hash == *parent)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Encodable for Transaction {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.put_u8(TX_VERSION);
        self.payload.encode(writer);
        writer.put_var_string(&self.memo);

        writer.put_var_uint(self.inputs.len() as u64);
        for input in &self.inputs {
            writer.put_uint256(&input.previous.tx_hash);
            writer.put_u16(input.previous.index);
            writer.put_u32(input.sequence);
        }

        writer.put_var_uint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(writer);
            writer.put_u8(output.output_type.to_byte());
        }

        writer.put_u32(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let version = reader.get_u8()?;
        if version != TX_VERSION {
            return Err(CodecError::InvalidValue(format!(
                "unsupported transaction version {:#04x}",
                version
            )));
        }
        let payload = TxPayload::decode(reader)?;
        let memo = reader.get_var_string()?;

        let input_count = reader.get_var_len(32 + 2 + 4)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let tx_hash = reader.get_uint256()?;
            let index = reader.get_u16()?;
            let sequence = reader.get_u32()?;
            inputs.push(TransactionInput {
                previous: OutPoint::new(tx_hash, index),
                sequence,
            });
        }

        let output_count = reader.get_var_len(TransactionOutput::SERIALIZED_SIZE + 1)?;
        if output_count > MAX_OUTPUTS {
            return Err(CodecError::InvalidValue(format!(
                "{} outputs exceed the {} an outpoint index can address",
                output_count, MAX_OUTPUTS
            )));
        }
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let mut output = TransactionOutput::decode(reader)?;
            output.output_type = OutputType::from_byte(reader.get_u8()?)?;
            outputs.push(output);
        }

        let lock_time = reader.get_u32()?;
        Ok(Transaction::new(payload, inputs, outputs, lock_time, memo))
    }
}
