use std::collections::BTreeMap;
use std::sync::RwLock;

use log::info;

use crate::NodeClient;

/// A known node: its identity, the network address it is bound to, and a
/// stub to call it.
#[derive(Clone, Debug)]
pub struct Peer {
    /// Identity, `host_port`.
    pub id: String,
    /// Network address, `host:port`.
    pub handle: String,
    /// Stub bound to `handle`.
    pub client: NodeClient,
}

/// Every node this node fans out to, itself included. Entries are never
/// removed.
#[derive(Debug, Default)]
pub struct Directory {
    peers: RwLock<BTreeMap<String, Peer>>,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer`, or refresh its handle if it is known already. Returns
    /// `true` for a new peer.
    pub fn register(&self, peer: Peer) -> bool {
        let id = peer.id.clone();
        let fresh = self.peers.write().unwrap().insert(id.clone(), peer).is_none();
        if fresh {
            info!("registered a new server: {}", id);
        }
        fresh
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: &str) -> bool {
        self.peers.read().unwrap().contains_key(id)
    }

    /// Every peer, ordered by identity.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    /// `(id, handle)` of every peer, ordered by identity.
    pub fn listing(&self) -> Vec<(String, String)> {
        self.peers
            .read()
            .unwrap()
            .values()
            .map(|p| (p.id.clone(), p.handle.clone()))
            .collect()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    /// Whether no peer is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrpc::{client::Client, Network};

    fn peer(net: &Network, id: &str, handle: &str) -> Peer {
        Peer {
            id: id.to_owned(),
            handle: handle.to_owned(),
            client: NodeClient::from_server(handle.to_owned(), net.registry().sender()),
        }
    }

    #[test]
    fn test_register() {
        let net = Network::new();
        let dir = Directory::new();
        assert!(dir.is_empty());

        assert!(dir.register(peer(&net, "b_2", "b:2")));
        assert!(dir.register(peer(&net, "a_1", "a:1")));
        assert!(!dir.register(peer(&net, "a_1", "a:10")));

        assert_eq!(dir.len(), 2);
        assert!(dir.contains("a_1"));
        assert_eq!(
            dir.listing(),
            vec![
                ("a_1".to_owned(), "a:10".to_owned()),
                ("b_2".to_owned(), "b:2".to_owned())
            ]
        );
        assert_eq!(dir.peers()[1].client.server_id(), "b:2");
    }
}
