//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use super::{address_from_uncompressed, hash_to_eth_signed_msg_hash, Recover, Sign, V_OFFSET};
use crate::abiencode::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};

pub use k256::ecdsa::Error;

#[derive(Debug)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        // The uncompressed encoding is always 65 bytes, if that changes in the
        // dependency its layout will likely have changed, too.
        let pk_bytes: [u8; 65] = key
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .expect("uncompressed SEC1 points are 65 bytes");
        address_from_uncompressed(&pk_bytes)
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        Self::from_key(SigningKey::random(rng))
    }

    /// Import a raw secp256k1 secret key.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, Error> {
        Ok(Self::from_key(SigningKey::from_bytes(secret)?))
    }

    fn from_key(key: SigningKey) -> Self {
        let addr = key.verifying_key().into();
        Self { key, addr }
    }
}

impl Sign for Signer {
    fn address(&self) -> Address {
        self.addr
    }

    fn sign_eth(&self, msg: Hash) -> Signature {
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self
            .key
            .sign_prehash(&hash.0)
            .expect("a 32 byte prehash is always accepted");

        // Already r, s and v in this order, but v needs the offset to be
        // valid in the EVM. k256 normalizes s, so the signature is canonical
        // as required by EIP-2.
        let mut sig_bytes: [u8; 65] = sig
            .as_bytes()
            .try_into()
            .expect("recoverable signatures are 65 bytes");
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += V_OFFSET;

        Signature(sig_bytes)
    }
}

impl Recover for Signer {
    type Error = Error;

    fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        Verifier.recover_signer(msg, eth_sig)
    }
}

/// Recovers signers without holding a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verifier;

impl Recover for Verifier {
    type Error = Error;

    fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        let hash = hash_to_eth_signed_msg_hash(msg);

        // Undo the offset, to go back to the format k256 expects.
        let mut sig_bytes: [u8; 65] = eth_sig.0;
        sig_bytes[64] = sig_bytes[64].checked_sub(V_OFFSET).ok_or_else(Error::new)?;

        let sig = recoverable::Signature::from_bytes(&sig_bytes)?;
        let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
        Ok(verifying_key.into())
    }
}
