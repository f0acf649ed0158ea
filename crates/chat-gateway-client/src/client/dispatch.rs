//! Ordered event dispatch
//!
//! Bridges the delivery buffer to the application's [`EventHandler`].

use crate::buffer::{FrameHandler, OrderedFrame};
use crate::connection::SessionHandle;
use crate::events::{ClientEvent, DropReason, EventHandler, GatewayEvent};
use async_trait::async_trait;
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What an event frame carried into the buffer
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Decoded {
        event_type: Option<String>,
        data: Value,
    },
    /// Holds the frame's sequence slot so ordering is unaffected
    Undecodable(String),
}

/// Buffer consumer that advances the session and forwards events
pub struct EventDispatcher {
    session: SessionHandle,
    handler: Arc<dyn EventHandler>,
    events: broadcast::Sender<ClientEvent>,
}

impl EventDispatcher {
    pub fn new(
        session: SessionHandle,
        handler: Arc<dyn EventHandler>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            session,
            handler,
            events,
        }
    }
}

#[async_trait]
impl FrameHandler<EventBody> for EventDispatcher {
    async fn handle(&self, frame: OrderedFrame<EventBody>) -> anyhow::Result<()> {
        let sequence = frame.sequence;
        self.session.advance(sequence);

        match frame.payload {
            EventBody::Decoded { event_type, data } => {
                tracing::trace!(sequence, event_type = ?event_type, "Dispatching event");
                self.handler
                    .on_event(GatewayEvent {
                        sequence,
                        event_type,
                        data,
                    })
                    .await
            }
            EventBody::Undecodable(reason) => {
                tracing::warn!(sequence, reason = %reason, "Skipping undecodable event");
                let _ = self.events.send(ClientEvent::FrameDropped {
                    sequence,
                    reason: DropReason::Undecodable(reason),
                });
                Ok(())
            }
        }
    }

    async fn skipped(&self, missing: RangeInclusive<u64>) -> anyhow::Result<()> {
        let (from, to) = missing.into_inner();
        let _ = self.events.send(ClientEvent::GapSkipped { from, to });
        Ok(())
    }
}
