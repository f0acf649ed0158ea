//! WebSocket transport
//!
//! Implements the connection manager's callbacks over tokio-tungstenite: one
//! writer task draining the outbound queue, one reader task routing decoded
//! frames, and a heartbeat task started on Hello.

use super::dispatch::{EventBody, EventDispatcher};
use super::ClientConfig;
use crate::buffer::{BufferError, EnqueueOutcome, SequencedDeliveryBuffer};
use crate::connection::{AttemptContext, ConnectMode, ConnectionHandler, SessionReady};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{ClientEvent, DropReason, EventHandler};
use crate::heartbeat::{HeartbeatMonitor, ProbeSender};
use crate::protocol::{Frame, FrameError, GatewayMessage, HelloPayload, ResumePayload};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel buffer size for outgoing messages
const OUTBOUND_BUFFER_SIZE: usize = 100;

/// How long teardown waits for the close frame to go out
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound queue shared by the reader and the heartbeat
#[derive(Clone)]
struct Outbound {
    tx: mpsc::Sender<GatewayMessage>,
    ctx: AttemptContext,
}

impl Outbound {
    async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| GatewayError::Transport("outbound queue closed".to_string()))
    }
}

#[async_trait]
impl ProbeSender for Outbound {
    async fn send_probe(&self) -> GatewayResult<()> {
        let last_sequence = self.ctx.session().snapshot().last_sequence;
        self.send(GatewayMessage::ping(last_sequence)).await
    }
}

/// Tasks serving the current socket
struct Link {
    cancel: CancellationToken,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Where the reader is in the session handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    AwaitingHello,
    Resuming,
    Ready,
}

/// State that outlives a single socket
struct Shared {
    config: ClientConfig,
    handler: Arc<dyn EventHandler>,
    events: broadcast::Sender<ClientEvent>,
    heartbeat: Arc<HeartbeatMonitor>,
    buffer: parking_lot::Mutex<Option<SequencedDeliveryBuffer<EventBody>>>,
}

/// Transport callbacks driven by the connection manager
pub(crate) struct GatewayTransport {
    shared: Arc<Shared>,
    link: parking_lot::Mutex<Option<Link>>,
}

impl GatewayTransport {
    pub(crate) fn new(
        config: ClientConfig,
        handler: Arc<dyn EventHandler>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                heartbeat: Arc::new(HeartbeatMonitor::new(config.heartbeat)),
                config,
                handler,
                events,
                buffer: parking_lot::Mutex::new(None),
            }),
            link: parking_lot::Mutex::new(None),
        }
    }

    pub(crate) fn heartbeat(&self) -> &Arc<HeartbeatMonitor> {
        &self.shared.heartbeat
    }

    /// Stop the delivery buffer, draining events already released
    pub(crate) async fn shutdown(&self) {
        let buffer = self.shared.buffer.lock().take();
        if let Some(buffer) = buffer {
            buffer.stop().await;
        }
    }
}

impl Shared {
    async fn open(&self) -> GatewayResult<WsStream> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::Transport(format!("invalid gateway url: {e}")))?;

        let auth = HeaderValue::from_str(&format!("Bot {}", self.config.token)).map_err(|_| {
            GatewayError::AuthenticationFailed("token is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(upgrade_error)?;
        Ok(stream)
    }

    /// Replace the delivery buffer with a new one for a fresh session
    async fn begin_fresh_buffer(
        &self,
        ctx: &AttemptContext,
        session_id: &str,
    ) -> GatewayResult<()> {
        let previous = self.buffer.lock().take();
        if let Some(previous) = previous {
            previous.stop().await;
        }
        // The old dispatcher has drained, nothing else advances the session
        ctx.session().begin(session_id);

        let buffer = SequencedDeliveryBuffer::new(self.config.buffer.clone());
        buffer.start(Arc::new(EventDispatcher::new(
            ctx.session().clone(),
            Arc::clone(&self.handler),
            self.events.clone(),
        )))?;
        *self.buffer.lock() = Some(buffer);
        Ok(())
    }

    /// Keep the existing buffer so replayed events are de-duplicated
    fn ensure_buffer(&self, ctx: &AttemptContext) -> GatewayResult<()> {
        let mut slot = self.buffer.lock();
        if slot.as_ref().is_some_and(SequencedDeliveryBuffer::is_running) {
            return Ok(());
        }

        let config = self
            .config
            .buffer
            .clone()
            .with_delivered_through(ctx.session().snapshot().last_sequence);
        let buffer = SequencedDeliveryBuffer::new(config);
        buffer.start(Arc::new(EventDispatcher::new(
            ctx.session().clone(),
            Arc::clone(&self.handler),
            self.events.clone(),
        )))?;
        *slot = Some(buffer);
        Ok(())
    }

    fn enqueue(&self, sequence: u64, body: EventBody) -> Result<EnqueueOutcome, BufferError> {
        let buffer = self.buffer.lock().clone();
        match buffer {
            Some(buffer) => buffer.enqueue(sequence, body),
            None => Ok(EnqueueOutcome::Inactive),
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: SplitStream<WsStream>, outbound: Outbound) {
        let ctx = outbound.ctx.clone();
        let cancel = ctx.cancellation().clone();
        let mut handshake = Handshake::AwaitingHello;

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => return,
                message = stream.next() => message,
            };

            let result = match message {
                Some(Ok(Message::Text(text))) => {
                    self.heartbeat.record_inbound();
                    self.route(&text, &outbound, &mut handshake).await
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    self.heartbeat.record_inbound();
                    Ok(())
                }
                Some(Ok(Message::Binary(_))) => Err(GatewayError::Protocol(
                    "binary frames are not supported".to_string(),
                )),
                Some(Ok(Message::Close(frame))) => Err(match frame {
                    Some(frame) => GatewayError::closed(Some(u16::from(frame.code)), frame.reason),
                    None => GatewayError::closed(None, "closed without status"),
                }),
                Some(Ok(Message::Frame(_))) => Ok(()),
                Some(Err(e)) => Err(GatewayError::Transport(e.to_string())),
                None => Err(GatewayError::closed(None, "stream ended")),
            };

            if let Err(error) = result {
                ctx.fault(error);
                return;
            }
        }
    }

    async fn route(
        &self,
        text: &str,
        outbound: &Outbound,
        handshake: &mut Handshake,
    ) -> GatewayResult<()> {
        let ctx = &outbound.ctx;

        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(FrameError::Malformed {
                sequence: Some(sequence),
                reason,
            }) => {
                // Still occupies its sequence
                return self.deliver(sequence, EventBody::Undecodable(reason));
            }
            Err(e) => {
                tracing::warn!(attempt = ctx.attempt(), error = %e, "Ignoring undecodable frame");
                return Ok(());
            }
        };
        tracing::trace!(op = %frame.op(), "Frame received");

        match frame {
            Frame::Hello(hello) => self.on_hello(hello, outbound, handshake).await,
            Frame::ResumeAck(ack) => {
                if *handshake != Handshake::Resuming {
                    tracing::warn!(session_id = %ack.session_id, "Unexpected resume ACK");
                    return Ok(());
                }
                *handshake = Handshake::Ready;
                ctx.signal_ready(SessionReady::Resumed {
                    session_id: ack.session_id,
                });
                Ok(())
            }
            Frame::Reconnect(payload) => {
                tracing::info!(
                    code = ?payload.code,
                    reason = ?payload.reason,
                    resuming = *handshake == Handshake::Resuming,
                    "Server requested reconnect"
                );
                Err(if *handshake == Handshake::Resuming {
                    GatewayError::ResumeFailed
                } else {
                    GatewayError::ReconnectRequested
                })
            }
            Frame::Ping => {
                self.heartbeat.probe(outbound).await;
                Ok(())
            }
            Frame::Pong => {
                if let Some(sample) = self.heartbeat.on_pong() {
                    let _ = self.events.send(ClientEvent::LatencyUpdated {
                        previous_ms: sample.previous.map(|d| d.as_millis() as u64),
                        current_ms: sample.current.as_millis() as u64,
                    });
                }
                Ok(())
            }
            Frame::Event {
                sequence,
                event_type,
                data,
            } => self.deliver(sequence, EventBody::Decoded { event_type, data }),
        }
    }

    async fn on_hello(
        &self,
        hello: HelloPayload,
        outbound: &Outbound,
        handshake: &mut Handshake,
    ) -> GatewayResult<()> {
        let ctx = &outbound.ctx;
        if *handshake != Handshake::AwaitingHello {
            return Err(GatewayError::Protocol("duplicate Hello".to_string()));
        }

        let interval = match hello.heartbeat_interval {
            Some(0) => {
                tracing::warn!(
                    fallback_ms = self.config.heartbeat.interval.as_millis() as u64,
                    "Hello advertised a zero heartbeat interval, using the configured one"
                );
                self.config.heartbeat.interval
            }
            Some(ms) => Duration::from_millis(ms),
            None => self.config.heartbeat.interval,
        };
        self.spawn_heartbeat(interval, outbound.clone());

        match ctx.mode() {
            ConnectMode::Fresh => {
                self.begin_fresh_buffer(ctx, &hello.session_id).await?;
                *handshake = Handshake::Ready;
                ctx.signal_ready(SessionReady::Fresh {
                    session_id: hello.session_id,
                });
            }
            ConnectMode::Resume {
                session_id,
                last_sequence,
            } => {
                tracing::debug!(session_id = %session_id, last_sequence, "Resuming session");
                // Replayed events may precede the ACK
                self.ensure_buffer(ctx)?;
                *handshake = Handshake::Resuming;
                outbound
                    .send(GatewayMessage::resume(&ResumePayload {
                        session_id: session_id.clone(),
                        seq: *last_sequence,
                    })?)
                    .await?;
            }
        }
        Ok(())
    }

    fn spawn_heartbeat(&self, interval: Duration, outbound: Outbound) {
        let heartbeat = Arc::clone(&self.heartbeat);
        heartbeat.reset();

        let ctx = outbound.ctx.clone();
        let cancel = ctx.cancellation().child_token();
        let task = tokio::spawn(async move { heartbeat.run(interval, &outbound, cancel).await });

        // A heartbeat that dies for any reason ends the attempt
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => ctx.fault(e),
                Err(e) => ctx.fault(GatewayError::Protocol(format!("heartbeat task failed: {e}"))),
            }
        });
    }

    fn deliver(&self, sequence: u64, body: EventBody) -> GatewayResult<()> {
        match self.enqueue(sequence, body) {
            Ok(EnqueueOutcome::Dropped) => {
                let _ = self.events.send(ClientEvent::FrameDropped {
                    sequence,
                    reason: DropReason::BufferFull,
                });
                Ok(())
            }
            Ok(EnqueueOutcome::Inactive) => {
                tracing::debug!(sequence, "Event before session start ignored");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = self.events.send(ClientEvent::FrameDropped {
                    sequence,
                    reason: DropReason::BufferFull,
                });
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ConnectionHandler for GatewayTransport {
    async fn connect(&self, ctx: AttemptContext) -> GatewayResult<()> {
        let stream = self.shared.open().await?;
        tracing::debug!(attempt = ctx.attempt(), url = %self.shared.config.url, "WebSocket opened");

        let (sink, stream) = stream.split();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        let outbound = Outbound {
            tx,
            ctx: ctx.clone(),
        };

        let writer = tokio::spawn(write_loop(sink, rx, ctx.clone()));
        let reader = tokio::spawn(Arc::clone(&self.shared).read_loop(stream, outbound));

        let previous = self.link.lock().replace(Link {
            cancel: ctx.cancellation().clone(),
            writer,
            reader,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            previous.reader.abort();
        }
        Ok(())
    }

    async fn teardown(&self) -> GatewayResult<()> {
        let link = self.link.lock().take();
        let Some(link) = link else {
            return Ok(());
        };

        link.cancel.cancel();
        link.reader.abort();
        match tokio::time::timeout(CLOSE_TIMEOUT, link.writer).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::Transport(format!("writer task failed: {e}"))),
            Err(_) => Err(GatewayError::Transport("timed out closing socket".to_string())),
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<GatewayMessage>,
    ctx: AttemptContext,
) {
    let cancel = ctx.cancellation().clone();

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound frame");
                continue;
            }
        };

        tracing::trace!(op = %message.op, "Frame sent");
        if let Err(e) = sink.send(Message::Text(json)).await {
            ctx.fault(GatewayError::Transport(format!("send failed: {e}")));
            return;
        }
    }

    let close = CloseFrame {
        code: WsCloseCode::Normal,
        reason: Cow::Borrowed("client disconnect"),
    };
    if let Err(e) = sink.send(Message::Close(Some(close))).await {
        tracing::debug!(error = %e, "Close frame not sent");
    }
    let _ = sink.close().await;
}

/// Map a failed upgrade; 401 and 403 mean the token was rejected
fn upgrade_error(error: WsError) -> GatewayError {
    match &error {
        WsError::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            GatewayError::AuthenticationFailed(format!("upgrade rejected: {}", response.status()))
        }
        _ => GatewayError::Transport(error.to_string()),
    }
}
