use labrpc::anyhow::Result;
use log::{error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{Method, Request, Response};
use crate::NodeClient;

/// Shown before every line of input.
pub const PROMPT: &str =
    "Please enter the request in a format as method: PUT|GET|DELETE, key: <key>[, value: <value>]";

/// Pairs written by [`Console::prepopulate`].
pub const PREPOPULATED: [(&str, &str); 5] = [
    ("Jesse", "75"),
    ("Gus", "60"),
    ("Chris", "80"),
    ("Julian", "95"),
    ("Ben", "101"),
];

/// Send `request` to the node behind `client` through the RPC matching its
/// method.
pub async fn dispatch(client: &NodeClient, request: Request) -> Result<Response> {
    match request.method() {
        Method::Put => client.put(request).await,
        Method::Get => client.get(request).await,
        Method::Delete => client.delete(request).await,
    }
}

/// Interactive session against one node: reads requests line by line from
/// `input` and writes rendered responses to `output`.
pub struct Console<R, W> {
    client: NodeClient,
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// New session talking to `client`.
    pub fn new(client: NodeClient, input: R, output: W) -> Self {
        Self {
            client,
            input,
            output,
        }
    }

    /// PUT the [`PREPOPULATED`] pairs.
    pub async fn prepopulate(&mut self) -> Result<()> {
        for (key, value) in PREPOPULATED.iter() {
            let resp = dispatch(&self.client, Request::put(*key, *value)).await?;
            info!("the pre-populate result given: {}", resp);
            self.write_line(&format!("Response: {}", resp)).await?;
        }
        Ok(())
    }

    /// Prompt, read, dispatch and print until `input` is exhausted. A
    /// malformed line is reported and skipped; a failed call is reported and
    /// the session goes on.
    pub async fn run(&mut self) -> Result<()> {
        let mut line = String::new();
        loop {
            self.write_line(PROMPT).await?;
            line.clear();
            if self.input.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let request = match line.trim().parse::<Request>() {
                Ok(request) => request,
                Err(e) => {
                    warn!("error on creating a request: {}", e);
                    self.write_line(&format!("Error on creating a request: {}", e))
                        .await?;
                    continue;
                }
            };
            match dispatch(&self.client, request).await {
                Ok(resp) => {
                    info!("Response: {}", resp);
                    self.write_line(&format!("Response: {}", resp)).await?;
                }
                Err(e) => {
                    error!("remote call failed: {}", e);
                    self.write_line(&format!("Remote call failed: {}", e)).await?;
                }
            }
        }
    }

    /// Give back the output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    async fn write_line(&mut self, s: &str) -> Result<()> {
        self.output.write_all(s.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }
}
