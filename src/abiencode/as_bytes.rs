//! Serialize any `&[u8]` as solidity `bytes` (dynamic length bytes).
//!
//! Without this, it would be serialized to a `uint8[]` of fixed or dynamic
//! length.
//!
//! # Example usage
//! ```ignore
//! # // We cannot run this test because abiencode is not public.
//! # use serde::Serialize;
//! # use nitro_core::abiencode::as_bytes;
//!
//! #[derive(Serialize, Debug)]
//! pub struct Vector {
//!     #[serde(with = "as_bytes")]
//!     pub data: Vec<u8>,
//! }
//! ```
//!
//! Hand written `Serialize` impls, which cannot use the attribute, pass an
//! [AbiBytes] to `serialize_field` instead.

use super::ser::DynamicMarker;
use serde::{ser::SerializeTuple, Serialize, Serializer};

/// Written with `serialize_bytes`, which cannot be requested when calling
/// `serialize_element`.
struct RawSlots<'a>(&'a [u8]);

impl<'a> Serialize for RawSlots<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

/// Borrowed `bytes` value.
#[derive(Debug, Clone, Copy)]
pub struct AbiBytes<'a>(pub &'a [u8]);

impl<'a> Serialize for AbiBytes<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize(self.0, serializer)
    }
}

pub fn serialize<S>(v: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut s = serializer.serialize_tuple(3)?;
    s.serialize_element(&DynamicMarker)?; // dynamic, but transparent
    s.serialize_element(&v.len())?; // length without padding
    s.serialize_element(&RawSlots(v))?;
    s.end()
}
