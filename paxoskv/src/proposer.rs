use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use std::{error::Error, fmt};

use futures::future::join_all;
use labrpc::anyhow;
use log::{debug, info, warn};

use crate::config::PaxosConfig;
use crate::directory::{Directory, Peer};
use crate::message::{Accept, Promise, Rejection, Request};

/// Low bits of a proposal number hold the proposing node's tag.
const TAG_BITS: u32 = 16;

/// Source of proposal numbers `(high << 16) | tag`. `high` follows the wall
/// clock in milliseconds but always moves past both the previous number and
/// any number observed in a rejection, so numbers strictly increase per node
/// and nodes with different tags never collide.
#[derive(Debug)]
pub struct ProposalNumbers {
    tag: u64,
    high: Mutex<u64>,
}

impl ProposalNumbers {
    /// Generator for the node tagged `tag`.
    pub fn new(tag: u16) -> Self {
        Self {
            tag: u64::from(tag),
            high: Mutex::new(0),
        }
    }

    /// A number greater than every number returned or observed before.
    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut high = self.high.lock().unwrap();
        *high = now.max(*high + 1);
        (*high << TAG_BITS) | self.tag
    }

    /// Record a number promised elsewhere so the next one exceeds it.
    pub fn observe(&self, proposal_num: u64) {
        let mut high = self.high.lock().unwrap();
        *high = (*high).max(proposal_num >> TAG_BITS);
    }
}

/// Smallest number of votes that is a strict majority of `peers`.
pub fn quorum(peers: usize) -> usize {
    peers / 2 + 1
}

/// Whether `votes` out of `peers` form a strict majority.
pub fn is_majority(votes: usize, peers: usize) -> bool {
    votes > peers / 2
}

/// The value carried by the promise with the highest non-zero previous
/// number, or `request` when no promise carries one.
pub fn choose_value<'a>(promises: impl IntoIterator<Item = &'a Promise>, request: &Request) -> Request {
    promises
        .into_iter()
        .filter(|p| p.prev_proposal_num != 0)
        .filter_map(|p| p.prev_accepted_value.as_ref().map(|v| (p.prev_proposal_num, v)))
        .max_by_key(|(num, _)| *num)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| request.clone())
}

/// Whether a learner reply shows the value applied there, now or earlier.
pub fn learn_landed(reply: &anyhow::Result<Result<(), Rejection>>) -> bool {
    matches!(reply, Ok(Ok(())) | Ok(Err(Rejection::AlreadyLearned { .. })))
}

/// A write could not be agreed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposeError {
    /// Every round of the budget ended without the request being learned.
    Timeout {
        /// Rounds attempted.
        rounds: u32,
    },
}

impl fmt::Display for ProposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposeError::Timeout { rounds } => {
                write!(f, "the maximum retries of Paxos has been reached ({} rounds)", rounds)
            }
        }
    }
}

impl Error for ProposeError {}

/// Drives Paxos rounds for client writes.
#[derive(Debug)]
pub struct Proposer {
    id: String,
    numbers: ProposalNumbers,
    config: PaxosConfig,
}

impl Proposer {
    /// Proposer of node `id`, numbering its proposals with `tag`.
    pub fn new(id: String, tag: u16, config: PaxosConfig) -> Self {
        Self {
            id,
            numbers: ProposalNumbers::new(tag),
            config,
        }
    }

    /// Get `request` agreed on by a majority of `directory` and learned by
    /// every acceptor of the deciding round. Returns the proposal number it
    /// was learned under.
    ///
    /// A round that has to carry an earlier accepted value completes that
    /// value first and the request goes again in the next round.
    pub async fn propose(&self, request: &Request, directory: &Directory) -> Result<u64, ProposeError> {
        for round in 1..=self.config.max_rounds {
            let proposal_num = self.numbers.next();
            let peers = directory.peers();
            info!(
                "{} starts round {} with proposal {} over {} peers",
                self.id,
                round,
                proposal_num,
                peers.len()
            );

            match self.round(proposal_num, request, &peers).await {
                Some(value) if value == *request => {
                    info!("{} round {} ended, proposal {} learned", self.id, round, proposal_num);
                    return Ok(proposal_num);
                }
                Some(value) => {
                    info!(
                        "{} completed an earlier value {} under {}, proposing again",
                        self.id, value, proposal_num
                    );
                    continue;
                }
                None => {}
            }

            if round < self.config.max_rounds {
                tokio::time::sleep(self.config.backoff).await;
            }
        }
        warn!("{} gave up on {}", self.id, request);
        Err(ProposeError::Timeout {
            rounds: self.config.max_rounds,
        })
    }

    /// One prepare/accept/learn round. Returns the learned value, or `None`
    /// when either phase missed a quorum or no learner applied the value.
    /// In the latter case the acceptors still hold it and the next round
    /// carries it again.
    async fn round(&self, proposal_num: u64, request: &Request, peers: &[Peer]) -> Option<Request> {
        let total = peers.len();

        // Phase 1: prepare-promise.
        let prepares = peers.iter().map(|peer| async move {
            (peer, peer.client.prepare(proposal_num).await)
        });
        let mut promised = Vec::new();
        for (peer, result) in join_all(prepares).await {
            match result {
                Ok(Ok(promise)) => {
                    debug!("{} received a promise from {}", self.id, peer.id);
                    promised.push((peer, promise));
                }
                Ok(Err(rejection)) => self.rejected(peer, "prepare", &rejection),
                Err(e) => warn!("{} prepare to {} failed: {}", self.id, peer.id, e),
            }
        }
        if !is_majority(promised.len(), total) {
            info!(
                "{} received {} of {} promises, needs {}",
                self.id,
                promised.len(),
                total,
                quorum(total)
            );
            return None;
        }

        let value = choose_value(promised.iter().map(|(_, p)| p), request);
        debug!("{} proposes {} under {}", self.id, value, proposal_num);

        // Phase 2: propose-accept, only to the peers that promised.
        let accepts = promised.iter().map(|(peer, _)| {
            let value = value.clone();
            async move { (*peer, peer.client.accept(proposal_num, value).await) }
        });
        let mut accepted: Vec<(&Peer, Accept)> = Vec::new();
        for (peer, result) in join_all(accepts).await {
            match result {
                Ok(Ok(accept)) => {
                    debug!("{} received an accept from {}", self.id, peer.id);
                    accepted.push((peer, accept));
                }
                Ok(Err(rejection)) => self.rejected(peer, "accept", &rejection),
                Err(e) => warn!("{} accept to {} failed: {}", self.id, peer.id, e),
            }
        }
        if !is_majority(accepted.len(), total) {
            info!(
                "{} received {} of {} accepts, needs {}",
                self.id,
                accepted.len(),
                total,
                quorum(total)
            );
            return None;
        }

        // Learn: each accepting peer gets its own acknowledgement back.
        let learns = accepted
            .into_iter()
            .map(|(peer, accept)| async move { (peer, peer.client.invoke_learner(accept).await) });
        let mut landed = 0;
        for (peer, result) in join_all(learns).await {
            if learn_landed(&result) {
                landed += 1;
            }
            match result {
                Ok(Ok(())) => debug!("{} invoked learner {}", self.id, peer.id),
                Ok(Err(rejection)) => debug!("learner {} declined: {}", peer.id, rejection),
                Err(e) => warn!("{} learn on {} failed: {}", self.id, peer.id, e),
            }
        }
        if landed == 0 {
            warn!("{} found no learner applying proposal {}", self.id, proposal_num);
            return None;
        }
        Some(value)
    }

    fn rejected(&self, peer: &Peer, phase: &str, rejection: &Rejection) {
        debug!("{} {} rejected by {}: {}", self.id, phase, peer.id, rejection);
        if let Rejection::Stale { promised } = rejection {
            self.numbers.observe(*promised);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promise(prev: u64, value: Option<Request>) -> Promise {
        Promise {
            acceptor_id: "acc".into(),
            proposal_num: 100,
            prev_proposal_num: prev,
            prev_accepted_value: value,
        }
    }

    #[test]
    fn test_quorum_arithmetic() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);

        assert!(is_majority(1, 1));
        assert!(!is_majority(0, 1));
        assert!(is_majority(2, 3));
        assert!(!is_majority(1, 3));
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 5));
        assert!(!is_majority(2, 5));
    }

    #[test]
    fn test_numbers_increase() {
        let numbers = ProposalNumbers::new(7);
        let mut last = 0;
        for _ in 0..1000 {
            let n = numbers.next();
            assert!(n > last);
            assert_eq!(n & 0xffff, 7);
            last = n;
        }
    }

    #[test]
    fn test_numbers_move_past_observed() {
        let numbers = ProposalNumbers::new(1);
        let far = numbers.next() + (1_000_000 << TAG_BITS);
        numbers.observe(far);
        assert!(numbers.next() > far);

        let other = ProposalNumbers::new(2);
        assert_ne!(numbers.next(), other.next());
    }

    #[test]
    fn test_learn_landed() {
        assert!(learn_landed(&Ok(Ok(()))));
        assert!(learn_landed(&Ok(Err(Rejection::AlreadyLearned { proposal_num: 3 }))));
        assert!(!learn_landed(&Ok(Err(Rejection::Injected))));
        assert!(!learn_landed(&Ok(Err(Rejection::Stale { promised: 9 }))));
        assert!(!learn_landed(&Err(anyhow::anyhow!("timeout"))));
    }

    #[test]
    fn test_choose_value() {
        let own = Request::put("A", "own");
        assert_eq!(choose_value(Vec::<Promise>::new().iter(), &own), own);
        assert_eq!(choose_value(&[promise(0, None), promise(0, None)], &own), own);

        let promises = [
            promise(3, Some(Request::put("A", "3"))),
            promise(0, None),
            promise(9, Some(Request::delete("B"))),
            promise(5, Some(Request::put("A", "5"))),
        ];
        assert_eq!(choose_value(&promises, &own), Request::delete("B"));
    }
}
