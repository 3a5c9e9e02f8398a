//! Handles the creation and verification of (Ethereum) Signatures.
//!
//! Key management is not part of this crate: whatever holds the keys only has
//! to implement [Sign], and the validator only needs [Recover]. The backends
//! below are the ones used by nodes that keep keys in memory.

use crate::abiencode::types::{Address, Hash, Signature};
use core::fmt::Debug;
use sha3::{Digest, Keccak256};

#[cfg(feature = "k256")]
pub mod k256;
#[cfg(feature = "secp256k1")]
pub mod secp256k1;

#[cfg(feature = "k256")]
pub use self::k256::{Signer, Verifier};
#[cfg(all(feature = "secp256k1", not(feature = "k256")))]
pub use self::secp256k1::{Signer, Verifier};

#[cfg(test)]
pub(crate) mod fake;

/// Something that can produce signatures the adjudicator accepts.
pub trait Sign {
    /// The participant address signatures recover to.
    fn address(&self) -> Address;

    /// Sign `msg` in the `"\x19Ethereum Signed Message:\n32"` format.
    fn sign_eth(&self, msg: Hash) -> Signature;
}

/// Recover the signer of a signature created by [Sign::sign_eth].
pub trait Recover {
    type Error: Debug;

    /// `msg` is the hash that was given to [Sign::sign_eth], without the
    /// `Ethereum Signed Message` prefix.
    fn recover_signer(&self, msg: Hash, sig: Signature) -> Result<Address, Self::Error>;
}

impl<T: Sign + ?Sized> Sign for &T {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign_eth(&self, msg: Hash) -> Signature {
        (**self).sign_eth(msg)
    }
}

impl<T: Recover + ?Sized> Recover for &T {
    type Error = T::Error;

    fn recover_signer(&self, msg: Hash, sig: Signature) -> Result<Address, Self::Error> {
        (**self).recover_signer(msg, sig)
    }
}

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
pub(crate) fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Ethereum address of an uncompressed SEC1 public key (65 bytes, `0x04`
/// prefix).
pub(crate) fn address_from_uncompressed(pk: &[u8; 65]) -> Address {
    // The first byte is the SEC1 tag, not part of the key.
    let hash: [u8; 32] = Keccak256::digest(&pk[1..]).into();

    let mut addr = Address::default();
    addr.0.copy_from_slice(&hash[32 - 20..]);
    addr
}

/// Offset added to the recovery id so it does not collide with Bitcoin's
/// prefixes, see [EIP-2098](https://eips.ethereum.org/EIPS/eip-2098).
pub(crate) const V_OFFSET: u8 = 27;
