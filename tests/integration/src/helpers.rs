//! Scripted gateway server
//!
//! Accepts WebSocket upgrades on an ephemeral port, checks the bot token,
//! and hands each accepted socket to the test to drive frame by frame.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chat_gateway_client::protocol::{GatewayMessage, HelloPayload, OpCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Upper bound on any single wait in a test
pub const WAIT: Duration = Duration::from_secs(5);

/// Heartbeat interval announced by default, long enough to stay out of the way
const QUIET_HEARTBEAT_MS: u64 = 60_000;

/// In-process gateway
pub struct MockGateway {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    accept_task: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway that accepts `Authorization: Bot <token>`
    pub async fn start(token: &str) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();
        let expected = format!("Bot {token}");

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let expected = expected.clone();
                tokio::spawn(async move {
                    // Rejected upgrades never reach the test
                    if let Ok(ws) = upgrade(stream, &expected).await {
                        let _ = tx.send(ServerConnection { ws });
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connections,
            accept_task,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Wait for the client's next successful upgrade
    pub async fn accept(&mut self) -> Result<ServerConnection> {
        self.accept_within(WAIT).await
    }

    pub async fn accept_within(&mut self, wait: Duration) -> Result<ServerConnection> {
        tokio::time::timeout(wait, self.connections.recv())
            .await
            .context("no client connected in time")?
            .ok_or_else(|| anyhow!("gateway stopped accepting"))
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn upgrade(stream: TcpStream, expected: &str) -> Result<WebSocketStream<TcpStream>, WsError> {
    let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        if token == Some(expected) {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("invalid token".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            Err(rejection)
        }
    };

    tokio_tungstenite::accept_hdr_async(stream, check).await
}

/// Server side of one accepted socket
pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    pub async fn send(&mut self, message: GatewayMessage) -> Result<()> {
        self.ws.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send Hello with a heartbeat interval that never fires during a test
    pub async fn hello(&mut self, session_id: &str) -> Result<()> {
        self.hello_with_interval(session_id, QUIET_HEARTBEAT_MS).await
    }

    pub async fn hello_with_interval(&mut self, session_id: &str, interval_ms: u64) -> Result<()> {
        let payload = HelloPayload::new(session_id).with_interval(interval_ms);
        self.send(GatewayMessage::hello(&payload)?).await
    }

    /// Send a `MESSAGE_CREATE` event carrying its own sequence
    pub async fn event(&mut self, sequence: u64) -> Result<()> {
        self.send(GatewayMessage::event(
            "MESSAGE_CREATE",
            sequence,
            json!({ "n": sequence }),
        ))
        .await
    }

    /// Read until the client sends a frame with `op`, skipping anything else
    pub async fn expect(&mut self, op: OpCode) -> Result<GatewayMessage> {
        let deadline = tokio::time::Instant::now() + WAIT;

        loop {
            let next = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .with_context(|| format!("timed out waiting for {op}"))?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    let message = GatewayMessage::from_json(&text)?;
                    if message.op == op {
                        return Ok(message);
                    }
                }
                Some(Ok(Message::Close(_))) | None => bail!("client closed before sending {op}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Close the socket with a gateway close code
    pub async fn close(mut self, code: u16, reason: &str) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Owned(reason.to_string()),
            }))
            .await?;
        Ok(())
    }
}
