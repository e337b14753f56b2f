use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::Future;
use log::{info, trace, warn};
use rand::Rng;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, server::Server};

#[derive(Debug, Clone)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

#[derive(Default)]
struct Routes {
    nodes: HashMap<String, Sender<NetworkPackage>>,
    disconnected: HashSet<String>,
    drop_rate: f32,
}

/// Name table of the network. Cloning it is cheap and every clone sees the
/// same bindings.
#[derive(Clone)]
pub struct Registry {
    tx: Sender<NetworkPackage>,
    routes: Arc<Mutex<Routes>>,
}

impl Registry {
    /// Bind `svc` under `id` and return a client for it together with the
    /// routine serving its inbound calls. Rebinding an existing id replaces
    /// the previous binding.
    pub fn register_service<S, C>(
        &self,
        id: String,
        svc: Arc<S::Service>,
    ) -> (C, impl Future<Output = ()>)
    where
        S: Server + Send + 'static,
        S::Service: Send + Sync,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        let mut server = S::from_service(svc);
        let previous = self
            .routes
            .lock()
            .unwrap()
            .nodes
            .insert(id.clone(), server.client_chan());
        if previous.is_some() {
            info!("rebound {}", id);
        }
        (client, async move {
            if let Err(e) = server.run().await {
                warn!("server {} stopped: {}", id, e);
            }
        })
    }

    /// Channel used by clients to reach the router.
    pub fn sender(&self) -> Sender<NetworkPackage> {
        self.tx.clone()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.routes.lock().unwrap().nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.routes.lock().unwrap().nodes.contains_key(id)
    }

    /// Drop every package addressed to `id` until [`Registry::connect`].
    pub fn disconnect(&self, id: &str) {
        self.routes.lock().unwrap().disconnected.insert(id.to_owned());
    }

    pub fn connect(&self, id: &str) {
        self.routes.lock().unwrap().disconnected.remove(id);
    }

    /// Probability in `[0, 1]` that a package is lost in transit.
    pub fn set_drop_rate(&self, rate: f32) {
        self.routes.lock().unwrap().drop_rate = rate.max(0.0).min(1.0);
    }

    fn route(&self, to: &str) -> Option<Sender<NetworkPackage>> {
        let routes = self.routes.lock().unwrap();
        if routes.disconnected.contains(to) {
            trace!("{} is disconnected, dropped", to);
            return None;
        }
        if routes.drop_rate > 0.0 && rand::thread_rng().gen::<f32>() < routes.drop_rate {
            trace!("package to {} lost", to);
            return None;
        }
        let node = routes.nodes.get(to).cloned();
        if node.is_none() {
            warn!("node {} not found", to);
        }
        node
    }
}

pub struct Network {
    registry: Registry,
    rx: Receiver<NetworkPackage>,
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            registry: Registry {
                tx,
                routes: Arc::new(Mutex::new(Routes::default())),
            },
            rx,
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Forward packages until every sender is gone. A package that cannot be
    /// delivered is dropped together with its reply channel, which the caller
    /// observes as a failed call.
    pub async fn run(&mut self) {
        while let Some(p) = self.rx.recv().await {
            if let Some(node) = self.registry.route(&p.to) {
                if node.send(p).await.is_err() {
                    warn!("send to node failed, dropped");
                }
            }
        }
        info!("network stopped");
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
