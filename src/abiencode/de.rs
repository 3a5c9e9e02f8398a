//! Strict, slot based reader for abi encoded data.
//!
//! There is no generic `Deserializer`: the layouts we decode are few and
//! known, so each type reads its fields from a [Reader] by slot index. Every
//! access is bounds checked, nothing here can panic on malformed input.
//!
//! The reader does not check that the input is canonical (e.g. that offsets
//! point to where the encoder would have put the value, or that there are no
//! trailing bytes). Callers that need that re-encode the decoded value and
//! compare.

use super::{
    error::DecodeError,
    ser::SLOT_SIZE,
    types::{Address, Bytes32, U256},
};

pub type Result<T> = core::result::Result<T, DecodeError>;

/// View into abi data. Slot indices are relative to `base`, which is the
/// start of the head of the tuple or array currently being read.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    /// Number of bytes from `base` to the end of the input.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.base)
    }

    pub fn slot(&self, index: usize) -> Result<&'a [u8; SLOT_SIZE]> {
        let start = index
            .checked_mul(SLOT_SIZE)
            .and_then(|o| o.checked_add(self.base))
            .ok_or(DecodeError::OutOfBounds)?;
        let end = start.checked_add(SLOT_SIZE).ok_or(DecodeError::OutOfBounds)?;
        self.data
            .get(start..end)
            .and_then(|s| s.try_into().ok())
            .ok_or(DecodeError::OutOfBounds)
    }

    pub fn uint(&self, index: usize) -> Result<U256> {
        Ok(U256::from_big_endian(self.slot(index)?))
    }

    /// A uint slot that has to fit into `usize` (lengths, offsets).
    pub fn usize(&self, index: usize) -> Result<usize> {
        let v = self.uint(index)?;
        if v > U256::from(usize::MAX) {
            return Err(DecodeError::ValueOutOfRange);
        }
        Ok(v.as_usize())
    }

    pub fn u64(&self, index: usize) -> Result<u64> {
        let v = self.uint(index)?;
        if v > U256::from(u64::MAX) {
            return Err(DecodeError::ValueOutOfRange);
        }
        Ok(v.as_u64())
    }

    pub fn u8(&self, index: usize) -> Result<u8> {
        let slot = self.slot(index)?;
        if slot[..SLOT_SIZE - 1].iter().any(|&b| b != 0) {
            return Err(DecodeError::ValueOutOfRange);
        }
        Ok(slot[SLOT_SIZE - 1])
    }

    pub fn bytes32(&self, index: usize) -> Result<Bytes32> {
        Ok(Bytes32(*self.slot(index)?))
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        let slot = self.slot(index)?;
        if slot[..SLOT_SIZE - 20].iter().any(|&b| b != 0) {
            return Err(DecodeError::ValueOutOfRange);
        }
        let mut addr = Address::default();
        addr.0.copy_from_slice(&slot[SLOT_SIZE - 20..]);
        Ok(addr)
    }

    /// Follow the offset stored at `index` to a dynamic value.
    pub fn follow(&self, index: usize) -> Result<Reader<'a>> {
        let offset = self.usize(index)?;
        if offset % SLOT_SIZE != 0 {
            return Err(DecodeError::InvalidOffset);
        }
        let base = self
            .base
            .checked_add(offset)
            .ok_or(DecodeError::InvalidOffset)?;
        if base > self.data.len() {
            return Err(DecodeError::OutOfBounds);
        }
        Ok(Reader {
            data: self.data,
            base,
        })
    }

    /// Read a dynamic array at the current position: returns the length and
    /// a reader positioned at the first element.
    ///
    /// Every element occupies at least one slot, so a length larger than what
    /// is left of the input is rejected before anyone allocates for it.
    pub fn array(&self) -> Result<(usize, Reader<'a>)> {
        let len = self.usize(0)?;
        let elements = Reader {
            data: self.data,
            base: self.base + SLOT_SIZE,
        };
        if len > elements.remaining() / SLOT_SIZE {
            return Err(DecodeError::OutOfBounds);
        }
        Ok((len, elements))
    }

    /// Read dynamic `bytes` at the current position.
    pub fn bytes(&self) -> Result<&'a [u8]> {
        let len = self.usize(0)?;
        let start = self.base + SLOT_SIZE;
        let padded = len
            .checked_add(SLOT_SIZE - 1)
            .ok_or(DecodeError::OutOfBounds)?
            / SLOT_SIZE
            * SLOT_SIZE;
        let end = start.checked_add(padded).ok_or(DecodeError::OutOfBounds)?;
        let region = self.data.get(start..end).ok_or(DecodeError::OutOfBounds)?;
        let (value, padding) = region.split_at(len);
        if padding.iter().any(|&b| b != 0) {
            return Err(DecodeError::InvalidPadding);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abiencode::{as_bytes, to_vec};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Data {
        a: u64,
        #[serde(with = "as_bytes")]
        b: [u8; 5],
        c: Address,
    }

    #[test]
    fn read_struct_with_bytes() {
        let d = Data {
            a: 0x1234,
            b: [0x11, 0x22, 0x33, 0x44, 0x55],
            c: Address([0xcc; 20]),
        };
        let encoded = to_vec(&d).unwrap();

        let r = Reader::new(&encoded).follow(0).unwrap();
        assert_eq!(r.u64(0).unwrap(), 0x1234);
        assert_eq!(r.follow(1).unwrap().bytes().unwrap(), &d.b);
        assert_eq!(r.address(2).unwrap(), d.c);
    }

    #[test]
    fn truncated_slot() {
        let data = [0u8; 31];
        assert_eq!(Reader::new(&data).slot(0), Err(DecodeError::OutOfBounds));
    }

    #[test]
    fn unaligned_offset() {
        let mut data = [0u8; 64];
        data[31] = 0x21;
        assert_eq!(
            Reader::new(&data).follow(0).unwrap_err(),
            DecodeError::InvalidOffset
        );
    }

    #[test]
    fn huge_array_length() {
        let mut data = [0u8; 64];
        data[0] = 0x01;
        // Length 2^248 does not fit anywhere.
        assert!(Reader::new(&data).array().is_err());

        let mut data = [0u8; 64];
        data[31] = 3;
        // Only one slot left for three elements.
        assert_eq!(
            Reader::new(&data).array().unwrap_err(),
            DecodeError::OutOfBounds
        );
    }

    #[test]
    fn dirty_address() {
        let mut data = [0u8; 32];
        data[0] = 1;
        assert_eq!(
            Reader::new(&data).address(0),
            Err(DecodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn dirty_bytes_padding() {
        let mut data = [0u8; 64];
        data[31] = 1; // length
        data[32] = 0xaa;
        data[33] = 0xbb; // should be padding
        assert_eq!(Reader::new(&data).bytes(), Err(DecodeError::InvalidPadding));
    }
}
