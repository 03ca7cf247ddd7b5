//! Minimal byte-level (de)serialization primitives.
//!
//! Modeled on the read-tag/dispatch/build shape the core project uses for its own node
//! serialization: a `Serializable`/`Deserializable` pair plus a cursor-style reader, rather
//! than pulling in a general-purpose serde backend for a handful of fixed binary layouts.

use pallas_core::{PallasError, Result};

pub trait ByteWriter {
    fn write_u8(&mut self, v: u8);
    fn write_bytes(&mut self, bytes: &[u8]);

    fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }
    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }
    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }
    fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}

impl ByteWriter for Vec<u8> {
    fn write_u8(&mut self, v: u8) {
        self.push(v);
    }
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// A borrowing cursor over an in-memory byte slice. Every read is bounds-checked and
/// returns `PallasError::Format` rather than panicking on a truncated chunk.
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| PallasError::format("unexpected end of buffer reading u8"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        Ok(arr)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(PallasError::format(format!(
                "unexpected end of buffer: need {n} bytes, have {}",
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u64()? as usize;
        self.read_bytes(len)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

pub trait Serializable {
    fn write_into<W: ByteWriter>(&self, w: &mut W);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_into(&mut buf);
        buf
    }
}

pub trait Deserializable: Sized {
    fn read_from(r: &mut SliceReader) -> Result<Self>;

    fn read_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = SliceReader::new(bytes);
        Self::read_from(&mut r)
    }
}
