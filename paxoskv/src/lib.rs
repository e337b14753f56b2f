#![deny(missing_docs)]
#![deny(clippy::all)]
//! Distributed KV Store based on Paxos.
//!
//! Every node holds a full copy of the store. PUT and DELETE are applied only
//! after a majority of the known nodes agreed on them; GET is served from the
//! local copy.

use std::collections::HashMap;

labrpc::service! {
    service node_svc {
        fn put(request: Request) -> Response;
        fn get(request: Request) -> Response;
        fn delete(request: Request) -> Response;
        fn prepare(proposal_num: u64) -> std::result::Result<Promise, Rejection>;
        fn accept(proposal_num: u64, request: Request) -> std::result::Result<Accept, Rejection>;
        fn invoke_learner(accepted: Accept) -> std::result::Result<(), Rejection>;
        fn register_new_server(id: String, handle: String) -> ();
        fn get_storage() -> HashMap<String, String>;
        fn get_server_id() -> String;
        fn list_servers() -> Vec<(String, String)>;
    }
}

pub use node_svc::{Client as NodeClient, Server as NodeServer, Service as NodeService};

/// Acceptor role and ballot state.
pub mod acceptor;
/// Node settings.
pub mod config;
/// Line-oriented client front end.
pub mod console;
/// Membership directory.
pub mod directory;
pub mod fault;
/// KV Store Server.
pub mod kv;
/// Learner role.
pub mod learner;
/// Client requests, responses and protocol messages.
pub mod message;
/// Proposer role.
pub mod proposer;
/// Local key-value state.
pub mod store;


pub use config::{NodeConfig, PaxosConfig};
pub use kv::Node;
pub use message::{Accept, Method, ParseError, Promise, Rejection, Request, Response, Status};
