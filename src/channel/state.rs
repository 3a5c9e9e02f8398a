//! Rust representations of the adjudicator's channel state.
//!
//! A [State] is split into the [FixedPart], which never changes over the
//! lifetime of a channel and determines its id, and the [VariablePart], which
//! is what participants sign off on turn after turn.

use crate::{
    abiencode::{
        self,
        as_bytes::AbiBytes,
        types::{Address, Bytes32, Hash},
    },
    outcome::Outcome,
};
use alloc::vec::Vec;
use serde::Serialize;

/// Parameters that are agreed upon when opening the channel.
///
/// The field order is the argument order of the channel id encoding, do not
/// reorder.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedPart {
    pub participants: Vec<Address>,
    pub channel_nonce: u64,
    pub app_definition: Address,
    pub challenge_duration: u64,
}

impl FixedPart {
    /// `keccak256(abi.encode(participants, channelNonce, appDefinition,
    /// challengeDuration))`
    pub fn channel_id(&self) -> Result<Bytes32, abiencode::Error> {
        abiencode::to_args_hash(self).map(Bytes32::from)
    }

    /// Position of `addr` in the participant list, which is also its bit in
    /// signer bitfields.
    pub fn participant_index(&self, addr: &Address) -> Option<usize> {
        self.participants.iter().position(|p| p == addr)
    }

    /// Index of the participant whose turn `turn_num` is, `None` if there are
    /// no participants.
    pub fn mover(&self, turn_num: u64) -> Option<usize> {
        let n = self.participants.len() as u64;
        if n == 0 {
            return None;
        }
        // Smaller than n, so it fits.
        Some((turn_num % n) as usize)
    }
}

/// The part of a state that changes with each update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariablePart {
    pub outcome: Outcome,
    pub app_data: Vec<u8>,
    pub turn_num: u64,
    pub is_final: bool,
}

impl VariablePart {
    /// Create the state that will replace this one, with the same outcome and
    /// app data. Callers modify the result before signing it.
    ///
    /// `None` if the turn number is exhausted.
    pub fn make_next(&self) -> Option<Self> {
        Some(Self {
            turn_num: self.turn_num.checked_add(1)?,
            ..self.clone()
        })
    }
}

/// Complete state of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    pub participants: Vec<Address>,
    pub channel_nonce: u64,
    pub app_definition: Address,
    pub challenge_duration: u64,
    pub outcome: Outcome,
    pub app_data: Vec<u8>,
    pub turn_num: u64,
    pub is_final: bool,
}

impl State {
    pub fn new(fixed: FixedPart, variable: VariablePart) -> Self {
        Self {
            participants: fixed.participants,
            channel_nonce: fixed.channel_nonce,
            app_definition: fixed.app_definition,
            challenge_duration: fixed.challenge_duration,
            outcome: variable.outcome,
            app_data: variable.app_data,
            turn_num: variable.turn_num,
            is_final: variable.is_final,
        }
    }

    pub fn fixed_part(&self) -> FixedPart {
        FixedPart {
            participants: self.participants.clone(),
            channel_nonce: self.channel_nonce,
            app_definition: self.app_definition,
            challenge_duration: self.challenge_duration,
        }
    }

    pub fn variable_part(&self) -> VariablePart {
        VariablePart {
            outcome: self.outcome.clone(),
            app_data: self.app_data.clone(),
            turn_num: self.turn_num,
            is_final: self.is_final,
        }
    }

    pub fn channel_id(&self) -> Result<Bytes32, abiencode::Error> {
        self.fixed_part().channel_id()
    }

    /// The hash participants sign, see [state_hash].
    pub fn hash(&self) -> Result<Hash, abiencode::Error> {
        let channel_id = self.channel_id()?;
        StateHashArgs {
            channel_id,
            app_data: AbiBytes(&self.app_data),
            outcome: &self.outcome,
            turn_num: self.turn_num,
            is_final: self.is_final,
        }
        .hash()
    }
}

#[derive(Serialize)]
struct StateHashArgs<'a> {
    channel_id: Bytes32,
    app_data: AbiBytes<'a>,
    outcome: &'a Outcome,
    turn_num: u64,
    is_final: bool,
}

impl<'a> StateHashArgs<'a> {
    fn hash(&self) -> Result<Hash, abiencode::Error> {
        abiencode::to_args_hash(self)
    }
}

/// `keccak256(abi.encode(channelId, appData, outcome, turnNum, isFinal))`
///
/// Equal to `State::new(fixed, variable).hash()` without cloning.
pub fn state_hash(fixed: &FixedPart, variable: &VariablePart) -> Result<Hash, abiencode::Error> {
    StateHashArgs {
        channel_id: fixed.channel_id()?,
        app_data: AbiBytes(&variable.app_data),
        outcome: &variable.outcome,
        turn_num: variable.turn_num,
        is_final: variable.is_final,
    }
    .hash()
}
