use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// Timeout applied to every call unless the stub overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
}
