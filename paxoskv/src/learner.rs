use std::collections::VecDeque;
use std::sync::Mutex;

use log::{debug, info};

use crate::acceptor::Acceptor;
use crate::message::{Accept, Method, Rejection, Request};
use crate::store::Store;

/// Number of recently learned proposals remembered besides the watermark.
pub const RECENT_WINDOW: usize = 64;

#[derive(Debug, Default)]
struct LearnerState {
    last_learned: u64,
    recent: VecDeque<(u64, Request)>,
}

impl LearnerState {
    fn has_learned(&self, proposal_num: u64) -> bool {
        self.last_learned == proposal_num || self.recent.iter().any(|(num, _)| *num == proposal_num)
    }

    fn record(&mut self, proposal_num: u64, request: Request) {
        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back((proposal_num, request));
        self.last_learned = proposal_num;
    }
}

/// Applies agreed values to the store. A proposal number matching the last
/// one learned, or one of the [`RECENT_WINDOW`] before it, is not applied again.
#[derive(Debug)]
pub struct Learner {
    id: String,
    state: Mutex<LearnerState>,
}

impl Learner {
    /// Create a learner for node `id`.
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: Mutex::new(LearnerState::default()),
        }
    }

    /// Apply `accepted` to `store` unless its proposal was learned already.
    /// When the value came from this node's own acceptor, the acceptor's
    /// outstanding value is settled as well. The watermark and the store
    /// mutation change together under the learner lock.
    pub fn learn(
        &self,
        accepted: &Accept,
        acceptor: &Acceptor,
        store: &Store,
    ) -> Result<(), Rejection> {
        let mut state = self.state.lock().unwrap();
        let proposal_num = accepted.proposal_num;
        if state.has_learned(proposal_num) {
            debug!("{} already learned {}", self.id, proposal_num);
            return Err(Rejection::AlreadyLearned { proposal_num });
        }

        if accepted.acceptor_id == self.id {
            acceptor.settle(proposal_num);
        }

        let request = &accepted.value;
        match (request.method(), request.value()) {
            (Method::Put, Some(value)) => store.put(request.key().to_owned(), value.to_owned()),
            (Method::Delete, _) => {
                store.delete(request.key());
            }
            _ => debug!("{} has nothing to apply for {}", self.id, request),
        }

        state.record(proposal_num, request.clone());
        info!("{} learned {}: {}", self.id, proposal_num, request);
        Ok(())
    }

    /// Number of the most recently applied proposal, 0 if none.
    pub fn last_learned(&self) -> u64 {
        self.state.lock().unwrap().last_learned
    }

    /// The last [`RECENT_WINDOW`] values applied, oldest first.
    pub fn recent(&self) -> Vec<(u64, Request)> {
        self.state.lock().unwrap().recent.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Reliable;
    use std::sync::Arc;

    fn accepted(acceptor_id: &str, proposal_num: u64, value: Request) -> Accept {
        Accept {
            acceptor_id: acceptor_id.to_owned(),
            proposal_num,
            value,
        }
    }

    #[test]
    fn test_learn_applies_writes() {
        let acceptor = Acceptor::new("n0".into(), Arc::new(Reliable));
        let learner = Learner::new("n0".into());
        let store = Store::new();

        learner
            .learn(&accepted("n0", 1, Request::put("A", "1")), &acceptor, &store)
            .unwrap();
        assert_eq!(store.get("A"), Some("1".to_owned()));

        learner
            .learn(&accepted("n0", 2, Request::delete("A")), &acceptor, &store)
            .unwrap();
        assert!(!store.contains("A"));
        assert_eq!(learner.last_learned(), 2);
        assert_eq!(
            learner.recent(),
            vec![(1, Request::put("A", "1")), (2, Request::delete("A"))]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let acceptor = Acceptor::new("n0".into(), Arc::new(Reliable));
        let learner = Learner::new("n0".into());
        let store = Store::new();

        for num in 1..=200 {
            learner
                .learn(&accepted("n1", num, Request::put("A", num.to_string())), &acceptor, &store)
                .unwrap();
        }
        assert_eq!(store.len(), 1);
        assert_eq!(learner.last_learned(), 200);
        let recent = learner.recent();
        assert_eq!(recent.len(), RECENT_WINDOW);
        assert_eq!(recent[0].0, 200 - RECENT_WINDOW as u64 + 1);

        // Still inside the window.
        let again = accepted("n1", 190, Request::put("A", "stale"));
        assert!(learner.learn(&again, &acceptor, &store).is_err());
        assert_eq!(store.get("A"), Some("200".to_owned()));
    }

    #[test]
    fn test_learn_is_idempotent() {
        let acceptor = Acceptor::new("n0".into(), Arc::new(Reliable));
        let learner = Learner::new("n0".into());
        let store = Store::new();
        let value = accepted("n0", 7, Request::put("A", "1"));

        learner.learn(&value, &acceptor, &store).unwrap();
        store.put("A".into(), "local".into());
        assert_eq!(
            learner.learn(&value, &acceptor, &store),
            Err(Rejection::AlreadyLearned { proposal_num: 7 })
        );
        assert_eq!(store.get("A"), Some("local".to_owned()));

        learner
            .learn(&accepted("n0", 8, Request::put("B", "2")), &acceptor, &store)
            .unwrap();
        assert!(learner.learn(&value, &acceptor, &store).is_err());
        assert_eq!(store.get("A"), Some("local".to_owned()));
    }

    #[test]
    fn test_learn_settles_own_acceptor() {
        let acceptor = Acceptor::new("n0".into(), Arc::new(Reliable));
        let learner = Learner::new("n0".into());
        let store = Store::new();

        let own = acceptor.accept(4, Request::put("A", "1")).unwrap();
        learner.learn(&own, &acceptor, &store).unwrap();
        let ballot = acceptor.ballot();
        assert_eq!(ballot.promised, 4);
        assert!(ballot.accepted_value.is_none());

        acceptor.accept(5, Request::put("B", "1")).unwrap();
        learner
            .learn(&accepted("n1", 6, Request::put("C", "1")), &acceptor, &store)
            .unwrap();
        assert_eq!(acceptor.ballot().accepted_num, 5);
    }
}
