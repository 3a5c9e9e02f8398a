//! Encoding of channel outcomes, byte compatible with the adjudicator.
//!
//! The layouts are the `abi.encode` of these Solidity structs:
//!
//! ```solidity
//! struct Guarantee { bytes32 left; bytes32 right; }
//! struct Allocation {
//!     bytes32 destination;
//!     uint256 amount;
//!     uint8 allocationType;
//!     bytes metadata;
//! }
//! struct SingleAssetExit {
//!     address asset;
//!     bytes metadata;
//!     Allocation[] allocations;
//! }
//! // An outcome is SingleAssetExit[]
//! ```
//!
//! Decoding is strict: the input must be exactly what encoding the decoded
//! value produces, otherwise it is rejected as a whole.

use crate::{
    abiencode::{
        self, as_bytes,
        as_bytes::AbiBytes,
        de::{self, Reader},
        types::{Address, Bytes32, U256},
        DecodeError as AbiDecodeError,
    },
    channel::is_address_in_array,
};
use alloc::vec::Vec;
use core::fmt::Display;
use serde::{ser::SerializeStruct, Serialize, Serializer};

/// `allocationType` of a plain allocation to an account or channel.
pub const ALLOCATION_TYPE_SIMPLE: u8 = 0;
/// `allocationType` of an allocation whose metadata is a [Guarantee].
pub const ALLOCATION_TYPE_GUARANTEE: u8 = 2;

const GUARANTEE_LEN: usize = 2 * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    MalformedGuarantee,
    MalformedAllocation,
    MalformedOutcome,
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DecodeError::MalformedGuarantee => "malformed guarantee",
            DecodeError::MalformedAllocation => "malformed allocation",
            DecodeError::MalformedOutcome => "malformed outcome",
        })
    }
}

/// Funds of a nested channel, backed by the outcomes of `left` and `right`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Guarantee {
    pub left: Bytes32,
    pub right: Bytes32,
}

impl Guarantee {
    /// Both referenced channels are in `known`.
    pub fn references_known(&self, known: &[Bytes32]) -> bool {
        is_address_in_array(&self.left, known) && is_address_in_array(&self.right, known)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    Simple,
    Guarantee(Guarantee),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// A channel id, or an account padded with zeroes (see
    /// [Bytes32::from_address]).
    pub destination: Bytes32,
    pub amount: U256,
    pub kind: AllocationKind,
}

impl Allocation {
    pub fn simple(destination: Bytes32, amount: U256) -> Self {
        Self {
            destination,
            amount,
            kind: AllocationKind::Simple,
        }
    }

    pub fn guarantee(destination: Bytes32, amount: U256, guarantee: Guarantee) -> Self {
        Self {
            destination,
            amount,
            kind: AllocationKind::Guarantee(guarantee),
        }
    }

    pub fn allocation_type(&self) -> u8 {
        match self.kind {
            AllocationKind::Simple => ALLOCATION_TYPE_SIMPLE,
            AllocationKind::Guarantee(_) => ALLOCATION_TYPE_GUARANTEE,
        }
    }
}

impl Serialize for Allocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let metadata = match self.kind {
            AllocationKind::Simple => None,
            AllocationKind::Guarantee(g) => Some(encode_guarantee(&g)),
        };

        let mut s = serializer.serialize_struct("Allocation", 4)?;
        s.serialize_field("destination", &self.destination)?;
        s.serialize_field("amount", &self.amount)?;
        s.serialize_field("allocationType", &self.allocation_type())?;
        s.serialize_field(
            "metadata",
            &AbiBytes(metadata.as_ref().map_or(&[][..], |m| &m[..])),
        )?;
        s.end()
    }
}

/// All allocations of a single asset.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SingleAssetExit {
    pub asset: Address,
    #[serde(with = "as_bytes")]
    pub metadata: Vec<u8>,
    pub allocations: Vec<Allocation>,
}

impl SingleAssetExit {
    pub fn new(asset: Address, allocations: Vec<Allocation>) -> Self {
        Self {
            asset,
            metadata: Vec::new(),
            allocations,
        }
    }

    /// Sum of all allocated amounts, `None` on overflow.
    pub fn total(&self) -> Option<U256> {
        self.allocations
            .iter()
            .try_fold(U256::zero(), |sum, a| sum.checked_add(a.amount))
    }
}

/// What a channel resolves to. The order of the assets is significant.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Outcome(pub Vec<SingleAssetExit>);

impl Outcome {
    /// Total of all exits for `asset`, zero if the asset does not appear.
    pub fn total_for(&self, asset: Address) -> Option<U256> {
        self.0
            .iter()
            .filter(|exit| exit.asset == asset)
            .try_fold(U256::zero(), |sum, exit| sum.checked_add(exit.total()?))
    }
}

impl From<Vec<SingleAssetExit>> for Outcome {
    fn from(exits: Vec<SingleAssetExit>) -> Self {
        Self(exits)
    }
}

pub fn encode_guarantee(g: &Guarantee) -> [u8; GUARANTEE_LEN] {
    let mut bytes = [0u8; GUARANTEE_LEN];
    bytes[..32].copy_from_slice(&g.left.0);
    bytes[32..].copy_from_slice(&g.right.0);
    bytes
}

pub fn decode_guarantee(bytes: &[u8]) -> Result<Guarantee, DecodeError> {
    if bytes.len() != GUARANTEE_LEN {
        tracing::debug!(len = bytes.len(), "malformed guarantee");
        return Err(DecodeError::MalformedGuarantee);
    }
    let mut g = Guarantee::default();
    g.left.0.copy_from_slice(&bytes[..32]);
    g.right.0.copy_from_slice(&bytes[32..]);
    Ok(g)
}

pub fn encode_allocation(a: &Allocation) -> Vec<u8> {
    abiencode::to_vec(a).expect("allocations are always representable in abi encoding")
}

pub fn decode_allocation(bytes: &[u8]) -> Result<Allocation, DecodeError> {
    decode_canonical(bytes, read_allocation, encode_allocation)
        .ok_or(DecodeError::MalformedAllocation)
}

pub fn encode_outcome(o: &Outcome) -> Vec<u8> {
    abiencode::to_vec(o).expect("outcomes are always representable in abi encoding")
}

pub fn decode_outcome(bytes: &[u8]) -> Result<Outcome, DecodeError> {
    decode_canonical(bytes, read_outcome, encode_outcome).ok_or(DecodeError::MalformedOutcome)
}

/// Read a dynamic value from the top level of `bytes` and make sure it is
/// encoded exactly as we would encode it: no trailing bytes, no overlapping
/// or shuffled offsets.
fn decode_canonical<T>(
    bytes: &[u8],
    read: impl Fn(&Reader) -> de::Result<T>,
    encode: impl Fn(&T) -> Vec<u8>,
) -> Option<T> {
    let value = match Reader::new(bytes).follow(0).and_then(|r| read(&r)) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "rejecting abi data");
            return None;
        }
    };
    if encode(&value) != bytes {
        tracing::debug!(len = bytes.len(), "rejecting non-canonical abi data");
        return None;
    }
    Some(value)
}

fn read_allocation(r: &Reader) -> de::Result<Allocation> {
    let metadata = r.follow(3)?.bytes()?;
    let kind = match r.u8(2)? {
        ALLOCATION_TYPE_SIMPLE if metadata.is_empty() => AllocationKind::Simple,
        ALLOCATION_TYPE_GUARANTEE => AllocationKind::Guarantee(
            decode_guarantee(metadata).map_err(|_| AbiDecodeError::ValueOutOfRange)?,
        ),
        _ => return Err(AbiDecodeError::ValueOutOfRange),
    };

    Ok(Allocation {
        destination: r.bytes32(0)?,
        amount: r.uint(1)?,
        kind,
    })
}

fn read_exit(r: &Reader) -> de::Result<SingleAssetExit> {
    let (count, elements) = r.follow(2)?.array()?;
    let allocations = (0..count)
        .map(|i| read_allocation(&elements.follow(i)?))
        .collect::<de::Result<Vec<_>>>()?;

    Ok(SingleAssetExit {
        asset: r.address(0)?,
        metadata: r.follow(1)?.bytes()?.to_vec(),
        allocations,
    })
}

fn read_outcome(r: &Reader) -> de::Result<Outcome> {
    let (count, elements) = r.array()?;
    (0..count)
        .map(|i| read_exit(&elements.follow(i)?))
        .collect::<de::Result<Vec<_>>>()
        .map(Outcome)
}
