//! Policies that make acceptors refuse calls on purpose, to exercise the
//! proposer's quorum handling.

use std::fmt::Debug;

/// Decides whether an acceptor refuses a `prepare` or `accept` for a given
/// proposal number.
pub trait FaultPolicy: Send + Sync + Debug {
    /// `true` to refuse.
    fn should_reject(&self, proposal_num: u64) -> bool;
}

/// Never refuses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reliable;

impl FaultPolicy for Reliable {
    fn should_reject(&self, _proposal_num: u64) -> bool {
        false
    }
}

/// Refuses every proposal number divisible by the modulus.
#[derive(Clone, Copy, Debug)]
pub struct EveryNth(pub u64);

impl FaultPolicy for EveryNth {
    fn should_reject(&self, proposal_num: u64) -> bool {
        self.0 != 0 && proposal_num % self.0 == 0
    }
}

/// Refuses everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReject;

impl FaultPolicy for AlwaysReject {
    fn should_reject(&self, _proposal_num: u64) -> bool {
        true
    }
}
