//! Signer using the C secp256k1 library.

use super::{address_from_uncompressed, hash_to_eth_signed_msg_hash, Recover, Sign, V_OFFSET};
use crate::abiencode::types::{Address, Hash, Signature};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey, VerifyOnly,
};

pub use secp256k1::Error;

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        address_from_uncompressed(&pk.serialize_uncompressed())
    }
}

#[derive(Debug)]
pub struct Signer {
    secp: Secp256k1<All>,
    sk: SecretKey,
    addr: Address,
}

impl Signer {
    pub fn new<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_key(SecretKey::new(rng))
    }

    /// Import a raw secp256k1 secret key.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, Error> {
        Ok(Self::from_key(SecretKey::from_slice(secret)?))
    }

    fn from_key(sk: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let addr = PublicKey::from_secret_key(&secp, &sk).into();
        Self { secp, sk, addr }
    }
}

impl Sign for Signer {
    fn address(&self) -> Address {
        self.addr
    }

    /// Ethereum 65-byte recoverable signature.
    ///
    /// Unlike transaction signatures this does not include the chain id
    /// (EIP-155), OpenZeppelin's recovery would reject those. The compact
    /// 64-byte form (EIP-2098) is not used either.
    fn sign_eth(&self, msg: Hash) -> Signature {
        let hash = hash_to_eth_signed_msg_hash(msg);

        // Recoverable, so the contract can get the address back.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from(hash), &self.sk);
        let (v, rs) = sig.serialize_compact();

        // EIP-2 makes signatures with a non-canonical s invalid. The library
        // produces canonical ones, fail early if that ever changes.
        debug_assert!(rs[32] & 0x80 == 0);

        // Recovery ids are 0..=3.
        Signature::new(&rs, V_OFFSET + v.to_i32() as u8)
    }
}

impl Recover for Signer {
    type Error = Error;

    fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover(&self.secp, msg, eth_sig)
    }
}

/// Recovers signers without holding a key.
#[derive(Debug)]
pub struct Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Recover for Verifier {
    type Error = Error;

    fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover(&self.secp, msg, eth_sig)
    }
}

fn recover<C: secp256k1::Verification>(
    secp: &Secp256k1<C>,
    msg: Hash,
    eth_sig: Signature,
) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    let v = eth_sig.0[64]
        .checked_sub(V_OFFSET)
        .ok_or(Error::InvalidRecoveryId)?;
    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(&eth_sig.0[..64], recid)?;

    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;
    Ok(pk.into())
}
