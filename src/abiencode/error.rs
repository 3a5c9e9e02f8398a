//! Error type and Return values used by the abi encoding and decoding.

use alloc::string::{String, ToString};
use core::fmt::Display;

use serde::ser;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The struct contains a type that is not directly representable in
    /// Solidity types.
    ///
    /// For example floating point numbers, enums and maps. We don't pick a
    /// representation for those because it would force a specific layout on
    /// the Solidity side. Enums should implement a custom `Serialize` that
    /// writes the discriminant as `uint8`.
    TypeNotRepresentable(&'static str),
    /// Although the type is representable in Solidity (currently only used for
    /// `char`), the Serializer currently does not implement this functionality.
    TypeNotYetSupported(&'static str),
    /// Raised by a `Serialize` implementation through [ser::Error::custom].
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Custom(msg.to_string())
    }
}
#[cfg(feature = "std")]
impl ser::StdError for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TypeNotRepresentable(type_name) => {
                f.write_str("type is not representable in abi encoding: ")?;
                f.write_str(type_name)
            }
            Error::TypeNotYetSupported(type_name) => {
                f.write_str("type is not yet implemented: ")?;
                f.write_str(type_name)
            }
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons why a byte string is not a valid abi encoding of the expected
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A slot or a dynamic value reaches past the end of the input.
    OutOfBounds,
    /// An offset is not slot aligned or does not fit into `usize`.
    InvalidOffset,
    /// A value does not fit into the expected Solidity type, e.g. an
    /// `address` with non-zero upper bytes.
    ValueOutOfRange,
    /// The padding after dynamic `bytes` is not zero.
    InvalidPadding,
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DecodeError::OutOfBounds => "abi data is truncated",
            DecodeError::InvalidOffset => "invalid offset in abi data",
            DecodeError::ValueOutOfRange => "value out of range for its abi type",
            DecodeError::InvalidPadding => "non-zero padding in abi data",
        })
    }
}
