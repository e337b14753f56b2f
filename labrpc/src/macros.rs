#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            #[allow(unused_imports)]
            use super::*;

            use std::sync::Arc;
            use std::time::Duration;

            use $crate::network::NetworkPackage;
            use $crate::{server, client};

            use $crate::tokio::{self, sync::mpsc::{self, Sender, Receiver}};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            #[allow(unused_imports)]
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{trace, warn};


            #[derive(Debug, Deserialize, Serialize)]
            pub enum Call {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod response {
                #[allow(unused_imports)]
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        /// Handler errors travel back as their rendered message.
                        pub data: std::result::Result<$output, String>
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + Sync + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
                timeout: Duration,
            }

            impl Client {

                $(
                    $(#[$method_attr])*
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let call = Call::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&call)?).await?;
                        let resp: response::$method_name = serde_json::from_str(&resp)?;
                        resp.data.map_err(|e| anyhow!("{}: {}", self.server_id, e))
                    }
                )*

                /// Address this stub talks to.
                pub fn server_id(&self) -> &str {
                    &self.server_id
                }

                pub fn with_timeout(mut self, timeout: Duration) -> Self {
                    self.timeout = timeout;
                    self
                }

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(1);
                    self.tx
                        .send(NetworkPackage{to: self.server_id.clone(), reply: tx, data: req.clone()})
                        .await
                        .map_err(|_| anyhow!("network is down"))?;
                    match tokio::time::timeout(self.timeout, rx.recv()).await {
                        Ok(Some(resp)) => {
                            trace!("req: {}, resp: {}", req, &resp);
                            Ok(resp)
                        }
                        Ok(None) => Err(anyhow!("unable to receive from server {}", self.server_id)),
                        Err(_) => Err(anyhow!("call to {} timed out", self.server_id)),
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                        timeout: client::DEFAULT_TIMEOUT,
                    }
                }
            }

            pub struct Server<T: Service> {
                svc: Arc<T>,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Arc<T>) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self {svc, tx, rx}
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn handle(&mut self) -> Result<()> {
                    match self.rx.recv().await {
                        Some(NetworkPackage{reply, data, ..}) => {
                            let svc = self.svc.clone();
                            // One task per call, a service may call itself.
                            tokio::spawn(async move {
                                if let Err(e) = dispatch(svc, reply, data).await {
                                    warn!("handle error: {}", e);
                                }
                            });
                            Ok(())
                        }
                        None => {Err(anyhow!("expected sender"))}
                    }
                }
            }

            async fn dispatch<T: Service>(svc: Arc<T>, reply: Sender<String>, data: String) -> Result<()> {
                trace!("handle recv: {}", &data);
                let call: Call = serde_json::from_str(&data)?;
                let resp = match call {
                    $(
                        Call::$method_name { $($arg_id),* } => {
                            let data = svc.$method_name($($arg_id),* ).await.map_err(|e| e.to_string());
                            serde_json::to_string(&response::$method_name { data })?
                        }
                    )*
                };
                trace!("handle send: {}", &resp);
                reply.send(resp).await.map_err(|_| anyhow!("caller went away"))?;
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::client::Client as _;
    use crate::Network;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    crate::service! {
        service counter_svc {
            fn add(n: u64) -> u64;
            fn fail() -> ();
        }
    }

    struct Counter(AtomicU64);

    #[crate::async_trait]
    impl counter_svc::Service for Counter {
        async fn add(&self, n: u64) -> crate::anyhow::Result<u64> {
            Ok(self.0.fetch_add(n, Ordering::SeqCst) + n)
        }
        async fn fail(&self) -> crate::anyhow::Result<()> {
            Err(crate::anyhow::anyhow!("boom"))
        }
    }

    fn spawn_counter(net: &Network, id: &str) -> counter_svc::Client {
        let (client, routine) = net
            .registry()
            .register_service::<counter_svc::Server<Counter>, counter_svc::Client>(
                id.to_owned(),
                Arc::new(Counter(AtomicU64::new(0))),
            );
        tokio::spawn(routine);
        client
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let mut net = Network::new();
        let client = spawn_counter(&net, "counter");
        tokio::spawn(async move { net.run().await });

        assert_eq!(client.add(2).await.unwrap(), 2);
        assert_eq!(client.add(3).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_handler_error_reaches_caller() {
        let mut net = Network::new();
        let client = spawn_counter(&net, "counter");
        tokio::spawn(async move { net.run().await });

        let err = client.fail().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_disconnected_node_is_unreachable() {
        let mut net = Network::new();
        let registry = net.registry();
        let client = spawn_counter(&net, "counter");
        tokio::spawn(async move { net.run().await });

        registry.disconnect("counter");
        assert!(client.add(1).await.is_err());
        registry.connect("counter");
        assert_eq!(client.add(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let mut net = Network::new();
        let registry = net.registry();
        tokio::spawn(async move { net.run().await });

        let client = counter_svc::Client::from_server("nobody".to_owned(), registry.sender())
            .with_timeout(Duration::from_millis(100));
        assert!(client.add(1).await.is_err());
        assert!(!registry.contains("nobody"));
    }

    #[tokio::test]
    async fn test_drop_rate() {
        let mut net = Network::new();
        let registry = net.registry();
        let client = spawn_counter(&net, "b").with_timeout(Duration::from_millis(100));
        spawn_counter(&net, "a");
        tokio::spawn(async move { net.run().await });
        assert_eq!(registry.list(), vec!["a".to_owned(), "b".to_owned()]);

        registry.set_drop_rate(1.0);
        assert!(client.add(1).await.is_err());
        registry.set_drop_rate(0.0);
        assert_eq!(client.add(1).await.unwrap(), 1);
    }
}
