//! Little-endian byte codec shared by transactions, outputs and merkle blocks.
//!
//! Buffers are plain `Vec<u8>` values owned by the caller; a `ByteWriter` appends to one and a
//! `ByteReader` walks a borrowed slice, failing with `CodecError` instead of reading past the end.

use crate::types::hash::{Uint168, Uint256};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid length: expected {expected}, found {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),
}

/// Types with a canonical byte encoding.
pub trait Encodable {
    fn encode(&self, writer: &mut ByteWriter);

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode(&mut writer);
        writer.into_inner()
    }
}

/// Types that can be decoded from their canonical byte encoding.
pub trait Decodable: Sized {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError>;

    /// Decode a whole buffer, rejecting trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        if reader.remaining() > 0 {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_uint256(&mut self, v: &Uint256) {
        self.buf.extend_from_slice(&v.0);
    }

    pub fn put_uint168(&mut self, v: &Uint168) {
        self.buf.extend_from_slice(&v.0);
    }

    /// Bitcoin-style compact size prefix.
    pub fn put_var_uint(&mut self, v: u64) {
        match v {
            0..=0xfc => self.put_u8(v as u8),
            0xfd..=0xffff => {
                self.put_u8(0xfd);
                self.put_u16(v as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.put_u8(0xfe);
                self.put_u32(v as u32);
            }
            _ => {
                self.put_u8(0xff);
                self.put_u64(v);
            }
        }
    }

    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_var_uint(bytes.len() as u64);
        self.put_bytes(bytes);
    }

    pub fn put_var_string(&mut self, s: &str) {
        self.put_var_bytes(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn get_uint256(&mut self) -> Result<Uint256, CodecError> {
        Ok(Uint256(self.take_array()?))
    }

    pub fn get_uint168(&mut self) -> Result<Uint168, CodecError> {
        Ok(Uint168(self.take_array()?))
    }

    pub fn get_var_uint(&mut self) -> Result<u64, CodecError> {
        match self.get_u8()? {
            0xfd => Ok(self.get_u16()? as u64),
            0xfe => Ok(self.get_u32()? as u64),
            0xff => self.get_u64(),
            v => Ok(v as u64),
        }
    }

    /// Read a compact-size length and check it against what is left in the buffer.
    pub fn get_var_len(&mut self, item_size: usize) -> Result<usize, CodecError> {
        let len = usize::try_from(self.get_var_uint()?)
            .map_err(|_| CodecError::InvalidValue("length prefix overflows usize".to_string()))?;
        let needed = len.saturating_mul(item_size.max(1));
        if needed > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(len)
    }

    pub fn get_var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.get_var_len(1)?;
        self.get_bytes(len)
    }

    pub fn get_var_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.get_var_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| CodecError::InvalidValue(format!("invalid utf-8: {}", e)))
    }
}
