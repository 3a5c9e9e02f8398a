//! Checking that a sequence of signed states supports the last of them.
//!
//! This is the off-chain counterpart of the adjudicator's support check: a
//! proof that fails here would be rejected on-chain as well, so nodes use it
//! before countersigning, challenging or accepting a checkpoint.

use super::state::{state_hash, FixedPart, VariablePart};
use crate::{
    abiencode::{
        self,
        types::{Address, Signature, U256},
    },
    bitfield::{encode_signer, is_signed_by, signer_count, MAX_PARTICIPANTS},
    outcome::Outcome,
    sig::{Recover, Sign},
};
use alloc::vec::Vec;
use core::fmt::Display;

/// Linear membership test, used for participant addresses as well as for
/// the channel ids of guarantees.
pub fn is_address_in_array<T: PartialEq>(candidate: &T, list: &[T]) -> bool {
    list.iter().any(|x| x == candidate)
}

/// A variable part together with the signatures participants put on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedVariablePart {
    pub variable_part: VariablePart,
    pub signatures: Vec<Signature>,
}

impl SignedVariablePart {
    pub fn new(variable_part: VariablePart) -> Self {
        Self {
            variable_part,
            signatures: Vec::new(),
        }
    }

    /// Sign the state made of `fixed` and `variable_part` with each of
    /// `signers`, in order.
    pub fn sign<S: Sign>(
        fixed: &FixedPart,
        variable_part: VariablePart,
        signers: &[S],
    ) -> Result<Self, abiencode::Error> {
        let hash = state_hash(fixed, &variable_part)?;
        Ok(Self {
            signatures: signers.iter().map(|s| s.sign_eth(hash)).collect(),
            variable_part,
        })
    }

    pub fn add_signature(&mut self, sig: Signature) {
        self.signatures.push(sig);
    }
}

/// When the union of signers in a proof is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupportRule {
    /// Every participant signed at least one entry.
    #[default]
    Unanimous,
    /// At least this many distinct participants signed (never less than one).
    Threshold(usize),
    /// The entry at turn `t` is signed by participant `t mod n`, and every
    /// participant signed at least one entry.
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidatorConfig {
    pub support_rule: SupportRule,
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supported {
    /// The last entry of the proof.
    pub variable_part: VariablePart,
    /// Bit `i` is set iff participant `i` signed some entry.
    pub signed_by: U256,
    pub outcome: Outcome,
}

/// Why a proof does not support its last state.
///
/// Checks run in a fixed order and the first failure is reported:
/// [TooManyParticipants][Self::TooManyParticipants] (the fixed part alone is
/// malformed), then [InvalidTurnOrder][Self::InvalidTurnOrder] (before any
/// signature is looked at), then the per-entry signer errors in entry order,
/// and finally [InsufficientSupport][Self::InsufficientSupport].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportError {
    /// The proof is empty or turn numbers are not strictly increasing.
    InvalidTurnOrder,
    /// A signature of `entry` could not be recovered (`None`) or does not
    /// belong to a participant.
    UnauthorizedSigner {
        entry: usize,
        signer: Option<Address>,
    },
    /// A participant signed `entry` more than once.
    DuplicateSigner { entry: usize, signer: Address },
    /// All signatures are valid, but the signers do not satisfy the rule.
    InsufficientSupport { signed_by: U256 },
    TooManyParticipants(usize),
    AbiEncodeError(abiencode::Error),
}

impl From<abiencode::Error> for SupportError {
    fn from(e: abiencode::Error) -> Self {
        Self::AbiEncodeError(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SupportError {}

impl Display for SupportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SupportError::InvalidTurnOrder => {
                f.write_str("turn numbers must be strictly increasing")
            }
            SupportError::UnauthorizedSigner {
                entry,
                signer: Some(signer),
            } => write!(f, "entry {entry} is signed by non-participant {signer:?}"),
            SupportError::UnauthorizedSigner {
                entry,
                signer: None,
            } => write!(f, "entry {entry} carries an unrecoverable signature"),
            SupportError::DuplicateSigner { entry, signer } => {
                write!(f, "entry {entry} is signed twice by {signer:?}")
            }
            SupportError::InsufficientSupport { signed_by } => {
                write!(f, "insufficient support, signed by {signed_by:#x}")
            }
            SupportError::TooManyParticipants(n) => write!(
                f,
                "{n} participants, at most {MAX_PARTICIPANTS} are supported"
            ),
            SupportError::AbiEncodeError(e) => write!(f, "failed to encode state: {e}"),
        }
    }
}

/// Validates support proofs with an injected signature recovery.
#[derive(Debug, Clone)]
pub struct SupportValidator<V: Recover> {
    verifier: V,
    config: ValidatorConfig,
}

impl<V: Recover> SupportValidator<V> {
    pub fn new(verifier: V, config: ValidatorConfig) -> Self {
        Self { verifier, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Check that `proof` supports its last entry for the channel described by
    /// `fixed`.
    pub fn validate(
        &self,
        fixed: &FixedPart,
        proof: &[SignedVariablePart],
    ) -> Result<Supported, SupportError> {
        let res = self.check(fixed, proof);
        match &res {
            Ok(s) => tracing::debug!(
                turn_num = s.variable_part.turn_num,
                signed_by = ?s.signed_by,
                "proof supports state"
            ),
            Err(e) => tracing::debug!(error = %e, entries = proof.len(), "rejecting proof"),
        }
        res
    }

    pub fn is_supported(&self, fixed: &FixedPart, proof: &[SignedVariablePart]) -> bool {
        self.validate(fixed, proof).is_ok()
    }

    /// Bitfield of the participants that signed `entry`.
    pub fn signers_of(
        &self,
        fixed: &FixedPart,
        entry: &SignedVariablePart,
    ) -> Result<U256, SupportError> {
        check_participants(fixed)?;
        self.entry_signers(fixed, 0, entry)
    }

    fn check(
        &self,
        fixed: &FixedPart,
        proof: &[SignedVariablePart],
    ) -> Result<Supported, SupportError> {
        check_participants(fixed)?;

        // Turn order is structural, check it before any (expensive) recovery.
        let last = match proof.last() {
            Some(last) => last,
            None => return Err(SupportError::InvalidTurnOrder),
        };
        if proof
            .windows(2)
            .any(|w| w[0].variable_part.turn_num >= w[1].variable_part.turn_num)
        {
            return Err(SupportError::InvalidTurnOrder);
        }

        let per_entry = proof
            .iter()
            .enumerate()
            .map(|(i, entry)| self.entry_signers(fixed, i, entry))
            .collect::<Result<Vec<_>, _>>()?;
        let signed_by = per_entry.iter().fold(U256::zero(), |acc, &b| acc | b);

        if !self.satisfies_rule(fixed, proof, &per_entry, signed_by) {
            return Err(SupportError::InsufficientSupport { signed_by });
        }

        Ok(Supported {
            variable_part: last.variable_part.clone(),
            signed_by,
            outcome: last.variable_part.outcome.clone(),
        })
    }

    fn entry_signers(
        &self,
        fixed: &FixedPart,
        entry: usize,
        signed: &SignedVariablePart,
    ) -> Result<U256, SupportError> {
        let hash = state_hash(fixed, &signed.variable_part)?;

        let mut signed_by = U256::zero();
        for sig in &signed.signatures {
            let signer = self.verifier.recover_signer(hash, *sig).map_err(|e| {
                tracing::debug!(entry, error = ?e, "unrecoverable signature");
                SupportError::UnauthorizedSigner {
                    entry,
                    signer: None,
                }
            })?;
            let index = fixed.participant_index(&signer).ok_or(
                SupportError::UnauthorizedSigner {
                    entry,
                    signer: Some(signer),
                },
            )?;
            tracing::trace!(entry, ?signer, index, "recovered signer");

            if is_signed_by(signed_by, index) {
                return Err(SupportError::DuplicateSigner { entry, signer });
            }
            signed_by = signed_by
                | encode_signer(index)
                    .map_err(|_| SupportError::TooManyParticipants(fixed.participants.len()))?;
        }
        Ok(signed_by)
    }

    fn satisfies_rule(
        &self,
        fixed: &FixedPart,
        proof: &[SignedVariablePart],
        per_entry: &[U256],
        signed_by: U256,
    ) -> bool {
        if signed_by.is_zero() {
            return false;
        }
        let everyone = signer_count(signed_by) == fixed.participants.len();

        match self.config.support_rule {
            SupportRule::Unanimous => everyone,
            SupportRule::Threshold(k) => signer_count(signed_by) >= k.max(1),
            SupportRule::RoundRobin => {
                everyone
                    && proof.iter().zip(per_entry).all(|(entry, &b)| {
                        fixed
                            .mover(entry.variable_part.turn_num)
                            .map_or(false, |mover| is_signed_by(b, mover))
                    })
            }
        }
    }
}

fn check_participants(fixed: &FixedPart) -> Result<(), SupportError> {
    let n = fixed.participants.len();
    if n > MAX_PARTICIPANTS {
        return Err(SupportError::TooManyParticipants(n));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bitfield::encode_signers,
        outcome::{Allocation, SingleAssetExit},
        sig::fake::{FakeSigner, FakeVerifier},
        Bytes32,
    };
    use alloc::vec;

    const ALICE: FakeSigner = FakeSigner(1);
    const BOB: FakeSigner = FakeSigner(2);
    const CAROL: FakeSigner = FakeSigner(3);

    fn fixed(signers: &[FakeSigner]) -> FixedPart {
        FixedPart {
            participants: signers.iter().map(|s| s.address()).collect(),
            channel_nonce: 1,
            app_definition: Address([0xaa; 20]),
            challenge_duration: 100,
        }
    }

    fn variable(turn_num: u64) -> VariablePart {
        VariablePart {
            outcome: Outcome(vec![SingleAssetExit::new(
                Address::default(),
                vec![Allocation::simple(
                    Bytes32::from_address(ALICE.address()),
                    turn_num.into(),
                )],
            )]),
            app_data: vec![],
            turn_num,
            is_final: false,
        }
    }

    fn entry(fixed: &FixedPart, turn_num: u64, signers: &[FakeSigner]) -> SignedVariablePart {
        SignedVariablePart::sign(fixed, variable(turn_num), signers).unwrap()
    }

    fn validator(support_rule: SupportRule) -> SupportValidator<FakeVerifier> {
        SupportValidator::new(FakeVerifier, ValidatorConfig { support_rule })
    }

    #[test]
    fn membership() {
        let mut list = vec![
            Address([1; 20]),
            Address([2; 20]),
            Address([3; 20]),
            Address([4; 20]),
        ];
        let candidate = Address([9; 20]);
        assert!(!is_address_in_array(&candidate, &list));
        list[2] = candidate;
        assert!(is_address_in_array(&candidate, &list));
        assert!(!is_address_in_array(&candidate, &[]));
    }

    #[test]
    fn unanimous_single_entry() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let proof = [entry(&f, 5, &[CAROL, ALICE, BOB])];

        let s = validator(SupportRule::Unanimous).validate(&f, &proof).unwrap();
        assert_eq!(s.signed_by, 0b111.into());
        assert_eq!(s.variable_part, variable(5));
        assert_eq!(s.outcome, variable(5).outcome);
    }

    #[test]
    fn unanimous_across_entries() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let proof = [
            entry(&f, 4, &[BOB]),
            entry(&f, 5, &[CAROL]),
            entry(&f, 6, &[ALICE]),
        ];

        let s = validator(SupportRule::Unanimous).validate(&f, &proof).unwrap();
        assert_eq!(s.signed_by, 0b111.into());
        assert_eq!(s.variable_part.turn_num, 6);
    }

    #[test]
    fn default_rule_is_unanimous() {
        let v = SupportValidator::new(FakeVerifier, ValidatorConfig::default());
        assert_eq!(v.config().support_rule, SupportRule::Unanimous);

        let f = fixed(&[ALICE, BOB]);
        assert!(!v.is_supported(&f, &[entry(&f, 1, &[ALICE])]));
        assert!(v.is_supported(&f, &[entry(&f, 1, &[ALICE, BOB])]));
    }

    #[test]
    fn zero_signatures() {
        let f = fixed(&[ALICE, BOB]);
        let proof = [SignedVariablePart::new(variable(1))];

        for rule in [
            SupportRule::Unanimous,
            SupportRule::Threshold(0),
            SupportRule::RoundRobin,
        ] {
            assert_eq!(
                validator(rule).validate(&f, &proof),
                Err(SupportError::InsufficientSupport {
                    signed_by: U256::zero()
                })
            );
        }
    }

    #[test]
    fn missing_participant() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let proof = [entry(&f, 1, &[ALICE]), entry(&f, 2, &[CAROL])];
        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &proof),
            Err(SupportError::InsufficientSupport {
                signed_by: encode_signers([0, 2]).unwrap()
            })
        );
    }

    #[test]
    fn turn_order() {
        let f = fixed(&[ALICE, BOB]);
        let v = validator(SupportRule::Unanimous);

        assert_eq!(v.validate(&f, &[]), Err(SupportError::InvalidTurnOrder));

        let equal = [entry(&f, 3, &[ALICE]), entry(&f, 3, &[BOB])];
        assert_eq!(v.validate(&f, &equal), Err(SupportError::InvalidTurnOrder));

        let decreasing = [entry(&f, 4, &[ALICE]), entry(&f, 3, &[BOB])];
        assert_eq!(
            v.validate(&f, &decreasing),
            Err(SupportError::InvalidTurnOrder)
        );

        // Reported even though the signatures are garbage.
        let mut garbage = [entry(&f, 4, &[]), entry(&f, 2, &[])];
        garbage[0].add_signature(Signature([0xff; 65]));
        assert_eq!(v.validate(&f, &garbage), Err(SupportError::InvalidTurnOrder));
    }

    #[test]
    fn duplicate_signer() {
        let f = fixed(&[ALICE, BOB]);
        let proof = [entry(&f, 1, &[ALICE]), entry(&f, 2, &[BOB, ALICE, BOB])];
        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &proof),
            Err(SupportError::DuplicateSigner {
                entry: 1,
                signer: BOB.address()
            })
        );
    }

    #[test]
    fn signing_the_same_participant_in_different_entries_is_fine() {
        let f = fixed(&[ALICE, BOB]);
        let proof = [entry(&f, 1, &[ALICE]), entry(&f, 2, &[ALICE, BOB])];
        assert!(validator(SupportRule::Unanimous).is_supported(&f, &proof));
    }

    #[test]
    fn unauthorized_signer() {
        let f = fixed(&[ALICE, BOB]);
        let mallory = FakeSigner(99);
        let proof = [entry(&f, 1, &[ALICE, mallory, BOB])];
        assert_eq!(
            validator(SupportRule::Threshold(1)).validate(&f, &proof),
            Err(SupportError::UnauthorizedSigner {
                entry: 0,
                signer: Some(mallory.address())
            })
        );
    }

    #[test]
    fn signature_over_another_state() {
        let f = fixed(&[ALICE, BOB]);
        let mut e = entry(&f, 2, &[ALICE]);
        let other = state_hash(&f, &variable(3)).unwrap();
        e.add_signature(BOB.sign_eth(other));

        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &[e]),
            Err(SupportError::UnauthorizedSigner {
                entry: 0,
                signer: None
            })
        );
    }

    #[test]
    fn signature_for_another_channel() {
        let f = fixed(&[ALICE, BOB]);
        let mut other_channel = f.clone();
        other_channel.channel_nonce += 1;
        let proof = [entry(&other_channel, 1, &[ALICE, BOB])];

        assert!(!validator(SupportRule::Unanimous).is_supported(&f, &proof));
    }

    #[test]
    fn threshold() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let proof = [entry(&f, 1, &[ALICE]), entry(&f, 2, &[CAROL])];

        assert!(validator(SupportRule::Threshold(2)).is_supported(&f, &proof));
        assert!(validator(SupportRule::Threshold(1)).is_supported(&f, &proof));
        assert_eq!(
            validator(SupportRule::Threshold(3)).validate(&f, &proof),
            Err(SupportError::InsufficientSupport {
                signed_by: 0b101.into()
            })
        );
    }

    #[test]
    fn round_robin() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let v = validator(SupportRule::RoundRobin);

        // Turn 4 is BOB's (4 mod 3 = 1), then CAROL, then ALICE.
        let proof = [
            entry(&f, 4, &[BOB]),
            entry(&f, 5, &[CAROL]),
            entry(&f, 6, &[ALICE]),
        ];
        let s = v.validate(&f, &proof).unwrap();
        assert_eq!(s.signed_by, 0b111.into());

        // Everyone signed, but not in turn.
        let proof = [
            entry(&f, 4, &[ALICE]),
            entry(&f, 5, &[CAROL]),
            entry(&f, 6, &[BOB]),
        ];
        assert_eq!(
            v.validate(&f, &proof),
            Err(SupportError::InsufficientSupport {
                signed_by: 0b111.into()
            })
        );

        // In turn, but CAROL never signed.
        let proof = [entry(&f, 3, &[ALICE]), entry(&f, 4, &[BOB])];
        assert!(!v.is_supported(&f, &proof));

        // A single unanimously signed state is in turn as well.
        let proof = [entry(&f, 7, &[ALICE, BOB, CAROL])];
        assert!(v.is_supported(&f, &proof));
    }

    #[test]
    fn idempotent() {
        let f = fixed(&[ALICE, BOB]);
        let v = validator(SupportRule::Unanimous);

        let good = [entry(&f, 1, &[ALICE]), entry(&f, 2, &[BOB])];
        assert_eq!(v.validate(&f, &good), v.validate(&f, &good));

        let bad = [entry(&f, 1, &[ALICE])];
        assert_eq!(v.validate(&f, &bad), v.validate(&f, &bad));
        assert!(v.validate(&f, &bad).is_err());
    }

    #[test]
    fn too_many_participants() {
        let f = FixedPart {
            participants: vec![Address::default(); MAX_PARTICIPANTS + 1],
            ..FixedPart::default()
        };
        let proof = [SignedVariablePart::new(variable(1))];
        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &proof),
            Err(SupportError::TooManyParticipants(MAX_PARTICIPANTS + 1))
        );
    }

    #[test]
    fn participant_limit_is_checked_before_turn_order() {
        let f = FixedPart {
            participants: vec![Address::default(); MAX_PARTICIPANTS + 1],
            ..FixedPart::default()
        };
        let decreasing = [
            SignedVariablePart::new(variable(2)),
            SignedVariablePart::new(variable(1)),
        ];
        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &decreasing),
            Err(SupportError::TooManyParticipants(MAX_PARTICIPANTS + 1))
        );

        let f = fixed(&[ALICE]);
        assert_eq!(
            validator(SupportRule::Unanimous).validate(&f, &decreasing),
            Err(SupportError::InvalidTurnOrder)
        );
    }

    #[test]
    fn no_participants() {
        let f = fixed(&[]);
        let v = validator(SupportRule::Unanimous);

        assert_eq!(
            v.validate(&f, &[SignedVariablePart::new(variable(1))]),
            Err(SupportError::InsufficientSupport {
                signed_by: U256::zero()
            })
        );
        assert_eq!(
            v.validate(&f, &[entry(&f, 1, &[ALICE])]),
            Err(SupportError::UnauthorizedSigner {
                entry: 0,
                signer: Some(ALICE.address())
            })
        );
    }

    #[test]
    fn signers_of_entry() {
        let f = fixed(&[ALICE, BOB, CAROL]);
        let v = validator(SupportRule::Unanimous);

        assert_eq!(
            v.signers_of(&f, &entry(&f, 1, &[CAROL, ALICE])),
            Ok(0b101.into())
        );
        assert_eq!(
            v.signers_of(&f, &SignedVariablePart::new(variable(1))),
            Ok(U256::zero())
        );
        assert_eq!(
            v.signers_of(&f, &entry(&f, 1, &[BOB, BOB])),
            Err(SupportError::DuplicateSigner {
                entry: 0,
                signer: BOB.address()
            })
        );
    }

    #[test]
    fn participant_beyond_first_word() {
        let signers: Vec<FakeSigner> = (0..=200).map(FakeSigner).collect();
        let f = fixed(&signers);
        let proof = [entry(&f, 1, &signers)];

        let s = validator(SupportRule::Unanimous).validate(&f, &proof).unwrap();
        assert_eq!(signer_count(s.signed_by), 201);
        assert!(is_signed_by(s.signed_by, 200));
    }

    #[cfg(feature = "k256")]
    #[test]
    fn k256_end_to_end() {
        use crate::sig::{Signer, Verifier};
        use rand::{rngs::StdRng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0);
        let alice = Signer::new(&mut rng);
        let bob = Signer::new(&mut rng);
        let f = FixedPart {
            participants: vec![alice.address(), bob.address()],
            channel_nonce: 42,
            app_definition: Address::default(),
            challenge_duration: 3600,
        };

        let first = SignedVariablePart::sign(&f, variable(0), &[&alice, &bob]).unwrap();
        let mut next = variable(0).make_next().unwrap();
        next.is_final = true;
        let second = SignedVariablePart::sign(&f, next.clone(), &[&bob]).unwrap();

        let v = SupportValidator::new(Verifier, ValidatorConfig::default());
        let s = v.validate(&f, &[first, second.clone()]).unwrap();
        assert_eq!(s.variable_part, next);
        assert_eq!(s.signed_by, 0b11.into());

        // Only BOB signed the final state.
        assert!(!v.is_supported(&f, &[second]));
    }
}
