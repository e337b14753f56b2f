use std::time::Duration;

/// Well-known endpoints a starting node tries, in order, to find a cluster.
pub const DEFAULT_DISCOVERY: [&str; 5] = [
    "127.0.0.1:4444",
    "127.0.0.1:5555",
    "127.0.0.1:6666",
    "127.0.0.1:7777",
    "127.0.0.1:8888",
];

/// Proposer retry settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PaxosConfig {
    /// Rounds attempted before a write reports a timeout.
    pub max_rounds: u32,
    /// Pause after a round that missed a quorum.
    pub backoff: Duration,
}

impl Default for PaxosConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Settings of a single node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    /// Host part of the node's address and identity.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Endpoints tried at startup to join an existing cluster.
    pub discovery: Vec<String>,
    /// Timeout of every outgoing call.
    pub rpc_timeout: Duration,
    /// Proposer settings.
    pub paxos: PaxosConfig,
}

impl NodeConfig {
    /// Defaults for a node listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port,
            discovery: DEFAULT_DISCOVERY.iter().map(|s| s.to_string()).collect(),
            rpc_timeout: Duration::from_secs(1),
            paxos: PaxosConfig::default(),
        }
    }

    /// Identity of the node, `host_port`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.host, self.port)
    }

    /// Network address of the node, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tag in the low bits of this node's proposal numbers. It is the port,
    /// so the nodes of one cluster must listen on distinct ports even when
    /// their hosts differ.
    pub fn tag(&self) -> u16 {
        self.port
    }
}

/// Proposal-number tag of the node identified by `id` (`host_port`).
pub fn tag_of(id: &str) -> Option<u16> {
    id.rsplit('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let config = NodeConfig::new(4444);
        assert_eq!(config.id(), "127.0.0.1_4444");
        assert_eq!(config.addr(), "127.0.0.1:4444");
        assert_eq!(config.discovery.len(), 5);
        assert_eq!(config.paxos.max_rounds, 3);
    }

    #[test]
    fn test_tag_of() {
        let config = NodeConfig::new(5555);
        assert_eq!(tag_of(&config.id()), Some(config.tag()));
        assert_eq!(tag_of("10.0.0.2_4444"), Some(4444));
        assert_eq!(tag_of("seed"), None);
    }
}
