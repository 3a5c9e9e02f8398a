//! Channel states and the proofs that a state is supported by the
//! participants.

mod state;
mod support;

pub use state::*;
pub use support::*;
