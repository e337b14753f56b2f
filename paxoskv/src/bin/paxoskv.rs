use std::sync::Arc;
use std::time::Duration;

use labrpc::{anyhow::Result, Network};
use log::error;
use paxoskv::{
    config::DEFAULT_DISCOVERY,
    console::Console,
    fault::{EveryNth, FaultPolicy, Reliable},
    Node, NodeConfig,
};
use structopt::StructOpt;
use tokio::io::{stdin, stdout, BufReader};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Ports of the nodes to launch, in start order
    #[structopt(short, long, default_value = "4444,5555,6666", use_delimiter = true)]
    ports: Vec<u16>,

    /// Host part of every node's address
    #[structopt(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the node the console talks to, defaults to the first one
    #[structopt(short, long)]
    target: Option<u16>,

    /// Well-known endpoints tried at startup, defaults to the built-in list
    #[structopt(long, use_delimiter = true)]
    discovery: Vec<String>,

    /// Pause after a round that missed a quorum, in milliseconds
    #[structopt(long, default_value = "2000")]
    backoff_ms: u64,

    /// Rounds tried before a write times out
    #[structopt(long, default_value = "3")]
    max_rounds: u32,

    /// Timeout of every call between nodes, in milliseconds
    #[structopt(long, default_value = "1000")]
    rpc_timeout_ms: u64,

    /// Make acceptors refuse proposal numbers divisible by this
    #[structopt(long)]
    fault_every: Option<u64>,

    /// Write the default pairs before reading input
    #[structopt(long)]
    prepopulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let discovery: Vec<String> = if opt.discovery.is_empty() {
        DEFAULT_DISCOVERY.iter().map(|s| s.to_string()).collect()
    } else {
        opt.discovery.clone()
    };
    let target = opt
        .target
        .or_else(|| opt.ports.first().copied())
        .ok_or_else(|| labrpc::anyhow::anyhow!("at least one port is required"))?;

    let mut net = Network::new();
    let registry = net.registry();
    tokio::spawn(async move {
        net.run().await;
    });

    let mut console_node = None;
    for port in opt.ports.iter().copied() {
        let config = NodeConfig {
            host: opt.host.clone(),
            port,
            discovery: discovery.clone(),
            rpc_timeout: Duration::from_millis(opt.rpc_timeout_ms),
            paxos: paxoskv::PaxosConfig {
                max_rounds: opt.max_rounds,
                backoff: Duration::from_millis(opt.backoff_ms),
            },
        };
        let fault: Arc<dyn FaultPolicy> = match opt.fault_every {
            Some(n) => Arc::new(EveryNth(n)),
            None => Arc::new(Reliable),
        };
        let node = Node::start(config, &registry, fault).await.map_err(|e| {
            error!("server error: {}", e);
            e
        })?;
        if port == target {
            console_node = Some(node);
        }
    }

    let node = console_node
        .ok_or_else(|| labrpc::anyhow::anyhow!("no node listens on port {}", target))?;
    let mut console = Console::new(node.client(), BufReader::new(stdin()), stdout());
    if opt.prepopulate {
        console.prepopulate().await?;
    }
    console.run().await
}
