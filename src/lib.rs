#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod abiencode {
    mod error;
    mod hashing;
    mod ser;

    pub mod as_bytes;
    pub mod de;
    pub mod types;

    pub use error::{DecodeError, Error, Result};
    pub use hashing::{to_args_hash, to_hash, Keccak256Writer};
    pub use ser::{to_args_vec, to_args_writer, to_vec, to_writer, Serializer, Writer};

    #[cfg(test)]
    pub mod tests;
}
pub mod bitfield;
pub mod channel;
pub mod outcome;
pub mod sig;

pub use abiencode::types::{Address, Bytes32, Hash, Signature, U256};
