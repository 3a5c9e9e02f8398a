//! Compact encoding of which participants signed a state.
//!
//! Bit `i` (least significant first) is set iff the participant with index `i`
//! in `FixedPart::participants` signed. The bitfield is a [U256], so a
//! channel can have at most [MAX_PARTICIPANTS] participants.

use crate::abiencode::types::U256;
use alloc::vec::Vec;
use core::fmt::Display;

/// Number of bits in a bitfield, and thus the maximum participant count.
pub const MAX_PARTICIPANTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitfieldError {
    /// The index is negative.
    InvalidIndex(i128),
    /// The index does not fit into the bitfield.
    IndexOutOfRange(usize),
}

#[cfg(feature = "std")]
impl std::error::Error for BitfieldError {}

impl Display for BitfieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BitfieldError::InvalidIndex(i) => write!(f, "invalid signer index {i}"),
            BitfieldError::IndexOutOfRange(i) => write!(
                f,
                "signer index {i} out of range, at most {MAX_PARTICIPANTS} participants are supported"
            ),
        }
    }
}

/// Integer types that can name a participant.
///
/// Signed types are accepted so that negative indices coming from other
/// representations are reported instead of wrapping around.
pub trait SignerIndex: Copy {
    fn to_signer_index(self) -> Result<usize, BitfieldError>;
}

macro_rules! impl_signer_index_unsigned {
    ($($T:ty),*) => {
        $(
            impl SignerIndex for $T {
                fn to_signer_index(self) -> Result<usize, BitfieldError> {
                    match usize::try_from(self) {
                        Ok(i) if i < MAX_PARTICIPANTS => Ok(i),
                        _ => Err(BitfieldError::IndexOutOfRange(
                            usize::try_from(self).unwrap_or(usize::MAX),
                        )),
                    }
                }
            }
        )*
    };
}

macro_rules! impl_signer_index_signed {
    ($($T:ty),*) => {
        $(
            impl SignerIndex for $T {
                fn to_signer_index(self) -> Result<usize, BitfieldError> {
                    if self < 0 {
                        return Err(BitfieldError::InvalidIndex(self as i128));
                    }
                    match usize::try_from(self) {
                        Ok(i) if i < MAX_PARTICIPANTS => Ok(i),
                        _ => Err(BitfieldError::IndexOutOfRange(
                            usize::try_from(self).unwrap_or(usize::MAX),
                        )),
                    }
                }
            }
        )*
    };
}

impl_signer_index_unsigned!(u8, u16, u32, u64, usize);
impl_signer_index_signed!(i8, i16, i32, i64, isize);

/// Number of participants that signed.
pub fn signer_count(bitfield: U256) -> usize {
    bitfield.0.iter().map(|word| word.count_ones() as usize).sum()
}

/// Indices of the participants that signed, in ascending order.
pub fn signer_indices(bitfield: U256) -> Vec<usize> {
    let mut indices = Vec::with_capacity(signer_count(bitfield));
    // Words are stored least significant first.
    for (w, &word) in bitfield.0.iter().enumerate() {
        let mut word = word;
        while word != 0 {
            let bit = word.trailing_zeros() as usize;
            indices.push(w * 64 + bit);
            word &= word - 1;
        }
    }
    indices
}

/// Bitfield with the bit of every index in `indices` set. Duplicates are
/// harmless.
pub fn encode_signers<I>(indices: I) -> Result<U256, BitfieldError>
where
    I: IntoIterator,
    I::Item: SignerIndex,
{
    indices
        .into_iter()
        .try_fold(U256::zero(), |bitfield, i| {
            Ok(bitfield | (U256::one() << i.to_signer_index()?))
        })
}

/// Bitfield with only the bit of `index` set.
pub fn encode_signer<T: SignerIndex>(index: T) -> Result<U256, BitfieldError> {
    encode_signers([index])
}

/// Whether the participant with `index` is part of the bitfield.
pub fn is_signed_by(bitfield: U256, index: usize) -> bool {
    index < MAX_PARTICIPANTS && bitfield.bit(index)
}
