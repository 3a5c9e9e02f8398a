//! Deterministic stand-in for a real signature scheme, so validator tests can
//! construct arbitrary (also wrong) signatures by hand.
//!
//! A fake signature is the signed hash in bytes `0..32`, zeroes, and the
//! signer's id in the last byte. Signer `id` has the address `[id; 20]`.

use super::{Recover, Sign};
use crate::abiencode::types::{Address, Hash, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSigner(pub u8);

impl Sign for FakeSigner {
    fn address(&self) -> Address {
        Address([self.0; 20])
    }

    fn sign_eth(&self, msg: Hash) -> Signature {
        let mut sig = Signature::default();
        sig.0[..32].copy_from_slice(&msg.0);
        sig.0[64] = self.0;
        sig
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongMessage;

#[derive(Debug, Default, Clone, Copy)]
pub struct FakeVerifier;

impl Recover for FakeVerifier {
    type Error = WrongMessage;

    fn recover_signer(&self, msg: Hash, sig: Signature) -> Result<Address, WrongMessage> {
        if sig.0[..32] != msg.0 {
            return Err(WrongMessage);
        }
        Ok(Address([sig.0[64]; 20]))
    }
}
