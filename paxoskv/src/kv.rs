use super::{NodeClient, NodeServer, NodeService};

use labrpc::{
    anyhow::{anyhow, bail, Result},
    client::Client,
    network::NetworkPackage,
    Registry,
};
use log::{debug, info, warn};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{mpsc::Sender, Mutex};

use crate::acceptor::Acceptor;
use crate::config::{tag_of, NodeConfig};
use crate::directory::{Directory, Peer};
use crate::fault::FaultPolicy;
use crate::learner::Learner;
use crate::message::{Accept, Method, Promise, Rejection, Request, Response};
use crate::proposer::Proposer;
use crate::store::Store;

/// One replica: acceptor, learner and proposer over a local store, plus the
/// directory of peers it replicates with.
pub struct Node {
    id: String,
    addr: String,
    store: Store,
    acceptor: Acceptor,
    learner: Learner,
    proposer: Proposer,
    directory: Directory,
    tag: u16,
    net: Sender<NetworkPackage>,
    rpc_timeout: Duration,

    // PUT, GET and DELETE run one at a time per node.
    writes: Mutex<()>,
}

impl Node {
    /// Build a node that is not bound to the network yet.
    pub fn new(config: &NodeConfig, registry: &Registry, fault: Arc<dyn FaultPolicy>) -> Self {
        let id = config.id();
        Self {
            store: Store::new(),
            acceptor: Acceptor::new(id.clone(), fault),
            learner: Learner::new(id.clone()),
            proposer: Proposer::new(id.clone(), config.tag(), config.paxos.clone()),
            tag: config.tag(),
            directory: Directory::new(),
            net: registry.sender(),
            rpc_timeout: config.rpc_timeout,
            addr: config.addr(),
            writes: Mutex::new(()),
            id,
        }
    }

    /// Bind a node under its address, serve it, and try to join a cluster
    /// through `config.discovery`. Fails when the address is taken.
    pub async fn start(
        config: NodeConfig,
        registry: &Registry,
        fault: Arc<dyn FaultPolicy>,
    ) -> Result<Arc<Node>> {
        let addr = config.addr();
        if registry.contains(&addr) {
            bail!("address {} is already in use", addr);
        }
        let node = Arc::new(Node::new(&config, registry, fault));
        let (client, routine) =
            registry.register_service::<NodeServer<Node>, NodeClient>(addr.clone(), node.clone());
        tokio::spawn(routine);
        info!("server {} started at {}", node.id, addr);

        node.directory.register(Peer {
            id: node.id.clone(),
            handle: addr,
            client: client.with_timeout(node.rpc_timeout),
        });
        node.discover(&config.discovery).await;
        Ok(node)
    }

    /// Try `endpoints` in order until one leads to a cluster. Returns `false`
    /// when the node ends up standalone.
    pub async fn discover(&self, endpoints: &[String]) -> bool {
        info!("{} is trying to connect to a cluster", self.id);
        for endpoint in endpoints.iter().filter(|e| **e != self.addr) {
            match self.join(endpoint).await {
                Ok(true) => {
                    info!("{} connected to a cluster through {}", self.id, endpoint);
                    return true;
                }
                Ok(false) => {}
                Err(e) => debug!("discovery endpoint {} unavailable: {}", endpoint, e),
            }
        }
        info!(
            "{} could not connect to any clusters, acting as a standalone cluster",
            self.id
        );
        false
    }

    /// Register with the node at `endpoint` and with every peer it knows. The
    /// store of `endpoint` is copied once the first registration goes through.
    async fn join(&self, endpoint: &str) -> Result<bool> {
        let seed = self.client_for(endpoint);
        let seed_id = seed.get_server_id().await?;
        if seed_id == self.id {
            return Ok(false);
        }

        // Best effort: writes landing on the seed meanwhile are missed.
        let mut snapshot = Some(seed.get_storage().await?);

        let mut known = seed.list_servers().await?;
        if !known.iter().any(|(id, _)| *id == seed_id) {
            known.push((seed_id, endpoint.to_owned()));
        }

        let mut joined = false;
        for (id, handle) in known {
            if id == self.id {
                continue;
            }
            if let Err(e) = self.check_tag(&id) {
                warn!("{} skips {}: {}", self.id, id, e);
                continue;
            }
            let client = self.client_for(&handle);
            match client
                .register_new_server(self.id.clone(), self.addr.clone())
                .await
            {
                Ok(()) => {
                    info!("{} registered with {}", self.id, id);
                    if let Some(snapshot) = snapshot.take() {
                        self.store.replace(snapshot);
                    }
                    self.directory.register(Peer { id, handle, client });
                    joined = true;
                }
                Err(e) => warn!("{} unable to register with {}: {}", self.id, id, e),
            }
        }
        Ok(joined)
    }

    /// Stub for the node bound at `handle`.
    pub fn client_for(&self, handle: &str) -> NodeClient {
        NodeClient::from_server(handle.to_owned(), self.net.clone()).with_timeout(self.rpc_timeout)
    }

    /// Stub for this node.
    pub fn client(&self) -> NodeClient {
        self.client_for(&self.addr)
    }

    /// Identity, `host_port`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Network address, `host:port`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Local replica of the store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Acceptor role.
    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    /// Learner role.
    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    /// Known peers.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Peers sharing our tag could issue the same proposal numbers.
    fn check_tag(&self, id: &str) -> Result<()> {
        if tag_of(id) == Some(self.tag) {
            bail!("{} has the same proposal tag {} as {}", id, self.tag, self.id);
        }
        Ok(())
    }

    fn expect_method(request: &Request, method: Method) -> Result<()> {
        if request.method() != method {
            return Err(anyhow!("expected a {} request, got {}", method, request));
        }
        Ok(())
    }
}

#[labrpc::async_trait]
impl NodeService for Node {
    async fn put(&self, request: Request) -> Result<Response> {
        Self::expect_method(&request, Method::Put)?;
        let _guard = self.writes.lock().await;
        info!("{} received a new request: {}", self.id, request);

        let resp = match self.proposer.propose(&request, &self.directory).await {
            Ok(_) => Response::ok(request.value().map(str::to_owned)),
            Err(e) => {
                warn!("{} time out: {}", self.id, e);
                Response::timeout()
            }
        };
        Ok(resp)
    }

    async fn get(&self, request: Request) -> Result<Response> {
        Self::expect_method(&request, Method::Get)?;
        let _guard = self.writes.lock().await;
        info!("{} received a new request: {}", self.id, request);

        let resp = match self.store.get(request.key()) {
            Some(value) => Response::ok(Some(value)),
            None => {
                info!("the key does not exist: {}", request.key());
                Response::not_found()
            }
        };
        Ok(resp)
    }

    async fn delete(&self, request: Request) -> Result<Response> {
        Self::expect_method(&request, Method::Delete)?;
        let _guard = self.writes.lock().await;
        info!("{} received a new request: {}", self.id, request);

        if !self.store.contains(request.key()) {
            info!("the key does not exist: {}", request.key());
            return Ok(Response::not_found());
        }
        let resp = match self.proposer.propose(&request, &self.directory).await {
            Ok(_) => Response::ok(None),
            Err(e) => {
                warn!("{} time out: {}", self.id, e);
                Response::timeout()
            }
        };
        Ok(resp)
    }

    async fn prepare(&self, proposal_num: u64) -> Result<std::result::Result<Promise, Rejection>> {
        Ok(self.acceptor.prepare(proposal_num))
    }

    async fn accept(
        &self,
        proposal_num: u64,
        request: Request,
    ) -> Result<std::result::Result<Accept, Rejection>> {
        Ok(self.acceptor.accept(proposal_num, request))
    }

    async fn invoke_learner(&self, accepted: Accept) -> Result<std::result::Result<(), Rejection>> {
        Ok(self.learner.learn(&accepted, &self.acceptor, &self.store))
    }

    async fn register_new_server(&self, id: String, handle: String) -> Result<()> {
        self.check_tag(&id)?;
        let client = self.client_for(&handle);
        self.directory.register(Peer { id, handle, client });
        Ok(())
    }

    async fn get_storage(&self) -> Result<HashMap<String, String>> {
        Ok(self.store.snapshot())
    }

    async fn get_server_id(&self) -> Result<String> {
        Ok(self.id.clone())
    }

    async fn list_servers(&self) -> Result<Vec<(String, String)>> {
        Ok(self.directory.listing())
    }
}
