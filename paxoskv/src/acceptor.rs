use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::fault::FaultPolicy;
use crate::message::{Accept, Promise, Rejection, Request};

/// Ballot state of one node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ballot {
    /// Highest proposal number promised or accepted. Never decreases.
    pub promised: u64,
    /// Number of the outstanding accepted value, 0 if none.
    pub accepted_num: u64,
    /// The outstanding accepted value.
    pub accepted_value: Option<Request>,
}

/// Votes on proposals. Every call runs atomically with respect to the ballot.
#[derive(Debug)]
pub struct Acceptor {
    id: String,
    ballot: Mutex<Ballot>,
    fault: Arc<dyn FaultPolicy>,
}

impl Acceptor {
    /// Create an acceptor for node `id` with no outstanding ballot.
    pub fn new(id: String, fault: Arc<dyn FaultPolicy>) -> Self {
        Self {
            id,
            ballot: Mutex::new(Ballot::default()),
            fault,
        }
    }

    /// Phase 1. Rejects numbers not above the current promise; otherwise
    /// reports the outstanding accepted value and promises `proposal_num`.
    pub fn prepare(&self, proposal_num: u64) -> Result<Promise, Rejection> {
        if self.fault.should_reject(proposal_num) {
            info!("{} is configured to fail prepare {}", self.id, proposal_num);
            return Err(Rejection::Injected);
        }
        let mut ballot = self.ballot.lock().unwrap();
        if proposal_num <= ballot.promised {
            debug!(
                "{} rejects prepare {}, promised {}",
                self.id, proposal_num, ballot.promised
            );
            return Err(Rejection::Stale {
                promised: ballot.promised,
            });
        }
        let promise = Promise {
            acceptor_id: self.id.clone(),
            proposal_num,
            prev_proposal_num: ballot.accepted_num,
            prev_accepted_value: ballot.accepted_value.clone(),
        };
        ballot.promised = proposal_num;
        debug!("{} promises {}", self.id, proposal_num);
        Ok(promise)
    }

    /// Phase 2. Unlike [`Acceptor::prepare`], a number equal to the promise
    /// is accepted.
    pub fn accept(&self, proposal_num: u64, request: Request) -> Result<Accept, Rejection> {
        if self.fault.should_reject(proposal_num) {
            info!("{} is configured to fail accept {}", self.id, proposal_num);
            return Err(Rejection::Injected);
        }
        let mut ballot = self.ballot.lock().unwrap();
        if proposal_num < ballot.promised {
            debug!(
                "{} rejects accept {}, promised {}",
                self.id, proposal_num, ballot.promised
            );
            return Err(Rejection::Stale {
                promised: ballot.promised,
            });
        }
        ballot.promised = proposal_num;
        ballot.accepted_num = proposal_num;
        ballot.accepted_value = Some(request.clone());
        info!("{} accepts {}: {}", self.id, proposal_num, request);
        Ok(Accept {
            acceptor_id: self.id.clone(),
            proposal_num,
            value: request,
        })
    }

    /// Forget the outstanding value once `proposal_num` has been learned, so
    /// the next round starts from the client's own request. A value accepted
    /// under a later number is kept, and the promise is never lowered.
    pub fn settle(&self, proposal_num: u64) {
        let mut ballot = self.ballot.lock().unwrap();
        if ballot.accepted_num <= proposal_num {
            ballot.accepted_num = 0;
            ballot.accepted_value = None;
        }
    }

    /// Copy of the current ballot.
    pub fn ballot(&self) -> Ballot {
        self.ballot.lock().unwrap().clone()
    }
}
