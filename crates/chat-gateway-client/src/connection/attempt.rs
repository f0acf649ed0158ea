//! Per-attempt context handed to the connect callback

use super::{ConnectMode, SessionHandle, SessionReady};
use crate::error::GatewayError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Everything a single connect attempt may use to report back
///
/// Clones share the same ready slot and fault channel.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    attempt: u32,
    mode: ConnectMode,
    session: SessionHandle,
    cancel: CancellationToken,
    ready: Arc<Mutex<Option<oneshot::Sender<SessionReady>>>>,
    faults: mpsc::UnboundedSender<GatewayError>,
}

/// Manager side of an [`AttemptContext`]
pub(crate) struct AttemptSignals {
    pub ready: oneshot::Receiver<SessionReady>,
    pub faults: mpsc::UnboundedReceiver<GatewayError>,
}

impl AttemptContext {
    pub(crate) fn new(
        attempt: u32,
        mode: ConnectMode,
        session: SessionHandle,
        cancel: CancellationToken,
    ) -> (Self, AttemptSignals) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let context = Self {
            attempt,
            mode,
            session,
            cancel,
            ready: Arc::new(Mutex::new(Some(ready_tx))),
            faults: fault_tx,
        };
        let signals = AttemptSignals {
            ready: ready_rx,
            faults: fault_rx,
        };
        (context, signals)
    }

    /// One-based attempt number since the manager started
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn mode(&self) -> &ConnectMode {
        &self.mode
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Cancelled when this attempt ends, for any reason
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve the attempt's ready signal
    ///
    /// Only the first call has any effect; returns whether it was this one.
    pub fn signal_ready(&self, ready: SessionReady) -> bool {
        let Some(tx) = self.ready.lock().take() else {
            return false;
        };
        tx.send(ready).is_ok()
    }

    /// End the attempt with an error
    ///
    /// Reports after the attempt was cancelled are discarded.
    pub fn fault(&self, error: GatewayError) {
        if self.cancel.is_cancelled() {
            tracing::trace!(attempt = self.attempt, error = %error, "Fault after attempt ended");
            return;
        }
        let _ = self.faults.send(error);
    }
}
