//! Lightweight JSON-RPC WebSocket client for CLI commands.
//!
//! CLI subcommands (`tasksyncd status`) use this to connect to the running
//! daemon and call RPC methods.

use anyhow::{Context as _, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// A short-lived WebSocket client for CLI-to-daemon RPC calls.
///
/// Drop to close the connection.
pub struct DaemonClient {
    url: String,
}

impl DaemonClient {
    /// Create a client targeting the daemon on the given port.
    pub fn new(port: u16) -> Self {
        let url = format!("ws://127.0.0.1:{port}");
        Self { url }
    }

    /// Connect and call one RPC method, returning the result.
    ///
    /// No authentication — only the pre-auth probe methods (`daemon.ping`,
    /// `daemon.status`) succeed this way. Uses a 5-second timeout for both
    /// connection and the RPC call.
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let timeout = std::time::Duration::from_secs(5);
        let (mut ws, _) = tokio::time::timeout(timeout, connect_async(&self.url))
            .await
            .context("timed out connecting to daemon")?
            .context("failed to connect to daemon WebSocket")?;

        let req = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });
        ws.send(Message::Text(serde_json::to_string(&req).unwrap()))
            .await?;

        self.read_response(&mut ws, 1).await
    }

    /// Read messages until we get the response with the given `id`.
    async fn read_response(
        &self,
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        id: u64,
    ) -> Result<Value> {
        let timeout = std::time::Duration::from_secs(5);
        loop {
            let msg = tokio::time::timeout(timeout, ws.next())
                .await
                .context("timed out waiting for daemon response")?
                .context("WebSocket stream ended")?
                .context("WebSocket error")?;

            if let Message::Text(text) = msg {
                let v: Value = serde_json::from_str(&text)?;
                if v.get("id").and_then(|x| x.as_u64()) == Some(id) {
                    if let Some(err) = v.get("error") {
                        anyhow::bail!("daemon RPC error: {err}");
                    }
                    return Ok(v["result"].clone());
                }
                // else: notification — skip and read next
            }
        }
    }
}
