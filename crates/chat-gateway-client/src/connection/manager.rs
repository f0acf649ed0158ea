//! Connection manager
//!
//! Runs one supervising task that connects, waits for ready or a fault,
//! tears down, classifies the fault, and backs off before the next attempt.
//! The manager is the only writer of the connection state and the session
//! descriptor.

use super::attempt::AttemptSignals;
use super::{
    AttemptContext, Backoff, ConnectionConfig, ConnectionHandler, ConnectionState,
    SessionDescriptor, SessionHandle, SessionReady,
};
use crate::error::{GatewayError, GatewayResult};
use crate::events::ClientEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How an attempt ended
enum AttemptEnd {
    Stopped,
    Faulted(GatewayError),
}

struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ManagerInner {
    config: ConnectionConfig,
    handler: Arc<dyn ConnectionHandler>,
    state: watch::Sender<ConnectionState>,
    session: SessionHandle,
    events: broadcast::Sender<ClientEvent>,
    /// Held while starting or stopping; at most one supervising loop exists
    supervisor: Mutex<Option<Supervisor>>,
}

/// Supervises connect attempts for one client
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        handler: Arc<dyn ConnectionHandler>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ManagerInner {
                session: SessionHandle::new(config.resume_max_attempts),
                config,
                handler,
                state,
                events,
                supervisor: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> SessionDescriptor {
        self.inner.session.snapshot()
    }

    #[must_use]
    pub fn session_handle(&self) -> SessionHandle {
        self.inner.session.clone()
    }

    /// Whether a supervising loop is alive
    pub async fn is_running(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Launch the supervising loop
    ///
    /// Fails unless the manager is disconnected with no loop running. A loop
    /// that ended on a critical error may be started again.
    pub async fn start(&self) -> GatewayResult<()> {
        let mut supervisor = self.inner.supervisor.lock().await;

        if supervisor.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return Err(GatewayError::AlreadyRunning);
        }

        let state = self.state();
        if state != ConnectionState::Disconnected {
            return Err(GatewayError::InvalidState {
                expected: ConnectionState::Disconnected,
                actual: state,
            });
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { inner.supervise(loop_cancel).await });

        *supervisor = Some(Supervisor { cancel, task });
        tracing::info!("Connection manager started");
        Ok(())
    }

    /// Abort any attempt and the supervising loop, waiting for teardown
    pub async fn stop(&self) {
        let Some(supervisor) = self.inner.supervisor.lock().await.take() else {
            return;
        };

        supervisor.cancel.cancel();
        if let Err(e) = supervisor.task.await {
            tracing::error!(error = %e, "Supervising loop panicked");
        }
        tracing::info!("Connection manager stopped");
    }
}

impl ManagerInner {
    async fn supervise(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let error = match self.run_attempt(attempt, &cancel, &mut backoff).await {
                AttemptEnd::Stopped => {
                    self.emit(ClientEvent::Disconnected {
                        error: None,
                        will_reconnect: false,
                    });
                    return;
                }
                AttemptEnd::Faulted(error) => error,
            };

            let class = error.classify();
            if class.is_critical() {
                tracing::error!(attempt, error = %error, "Critical gateway error, giving up");
            } else {
                tracing::warn!(
                    attempt,
                    error = %error,
                    clear_session = class.clears_session(),
                    "Gateway connection lost"
                );
            }

            self.emit(ClientEvent::Disconnected {
                error: Some(Arc::new(error)),
                will_reconnect: !class.is_critical(),
            });
            if class.is_critical() {
                return;
            }

            let delay = backoff.next_delay();
            tracing::info!(
                attempt,
                failures = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Stopped during backoff");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: u32,
        loop_cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> AttemptEnd {
        self.transition(ConnectionState::Connecting);

        let mode = self.session.plan();
        let attempt_cancel = loop_cancel.child_token();
        let (ctx, mut signals) = AttemptContext::new(
            attempt,
            mode.clone(),
            self.session.clone(),
            attempt_cancel.clone(),
        );
        tracing::debug!(attempt, resume = mode.is_resume(), "Connecting to gateway");

        let deadline = Instant::now() + self.config.connect_timeout;
        let mut reached_ready = false;

        let end = match self.await_ready(ctx, &mut signals, loop_cancel, deadline).await {
            Ok(ready) => {
                reached_ready = true;
                self.session.record_ready(&ready);
                backoff.reset();
                self.transition(ConnectionState::Connected);

                tracing::info!(
                    attempt,
                    session_id = %ready.session_id(),
                    resumed = ready.is_resumed(),
                    "Gateway session ready"
                );
                self.emit(ClientEvent::Ready {
                    session_id: ready.session_id().to_string(),
                    resumed: ready.is_resumed(),
                });

                Self::await_fault(&mut signals, loop_cancel).await
            }
            Err(end) => end,
        };

        attempt_cancel.cancel();
        self.transition(ConnectionState::Disconnecting);
        if let Err(e) = self.handler.teardown().await {
            tracing::warn!(attempt, error = %e, "Transport teardown failed");
        }
        self.transition(ConnectionState::Disconnected);

        if let AttemptEnd::Faulted(error) = &end {
            if error.classify().clears_session() {
                self.session.clear();
            } else if mode.is_resume() && !reached_ready {
                self.session.record_resume_failure();
            }
        }

        end
    }

    async fn await_ready(
        &self,
        ctx: AttemptContext,
        signals: &mut AttemptSignals,
        loop_cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<SessionReady, AttemptEnd> {
        tokio::select! {
            biased;
            () = loop_cancel.cancelled() => return Err(AttemptEnd::Stopped),
            () = tokio::time::sleep_until(deadline) => {
                return Err(AttemptEnd::Faulted(GatewayError::ConnectTimeout));
            }
            result = self.handler.connect(ctx) => {
                if let Err(e) = result {
                    return Err(AttemptEnd::Faulted(e));
                }
            }
        }

        tokio::select! {
            biased;
            () = loop_cancel.cancelled() => Err(AttemptEnd::Stopped),
            ready = &mut signals.ready => match ready {
                Ok(ready) => Ok(ready),
                Err(_) => Err(AttemptEnd::Faulted(
                    signals.faults.try_recv().unwrap_or_else(|_| abandoned()),
                )),
            },
            fault = signals.faults.recv() => {
                Err(AttemptEnd::Faulted(fault.unwrap_or_else(abandoned)))
            }
            () = tokio::time::sleep_until(deadline) => {
                Err(AttemptEnd::Faulted(GatewayError::ConnectTimeout))
            }
        }
    }

    async fn await_fault(
        signals: &mut AttemptSignals,
        loop_cancel: &CancellationToken,
    ) -> AttemptEnd {
        tokio::select! {
            biased;
            () = loop_cancel.cancelled() => AttemptEnd::Stopped,
            fault = signals.faults.recv() => AttemptEnd::Faulted(fault.unwrap_or_else(abandoned)),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let old = self.state.send_replace(next);
        if old == next {
            return;
        }
        if !old.can_transition_to(next) {
            tracing::warn!(from = %old, to = %next, "Out-of-order state transition");
        }

        tracing::debug!(from = %old, to = %next, "Connection state changed");
        self.emit(ClientEvent::StateChanged { old, new: next });
    }

    fn emit(&self, event: ClientEvent) {
        // No listeners is fine
        let _ = self.events.send(event);
    }
}

/// Every context clone was dropped without a report
fn abandoned() -> GatewayError {
    GatewayError::Transport("connection attempt ended without reporting".to_string())
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("session", &self.session())
            .finish()
    }
}
