//! Sequenced delivery buffer
//!
//! Wraps a [`SequenceWindow`] in a lock, a dispatch task and an optional
//! gap timer. Frames are released into an unbounded channel while the lock is
//! held, so the handler sees them in sequence order even though it runs on
//! its own task and never under the lock.

use super::{
    BufferConfig, BufferError, EnqueueOutcome, GapTimeoutPolicy, Offer, OrderedFrame,
    SequenceStart, SequenceWindow,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The single downstream consumer of a buffer
#[async_trait]
pub trait FrameHandler<T>: Send + Sync + 'static {
    /// Called once per released frame, strictly in sequence order
    ///
    /// Errors are logged; they never roll back the buffer.
    async fn handle(&self, frame: OrderedFrame<T>) -> anyhow::Result<()>;

    /// Called when a gap timeout gives up on `missing`
    ///
    /// Ordered with `handle`: it runs after every frame below the range and
    /// before any frame above it.
    async fn skipped(&self, missing: RangeInclusive<u64>) -> anyhow::Result<()> {
        let _ = missing;
        Ok(())
    }
}

/// Work item for the dispatch task
enum Delivery<T> {
    Frame(OrderedFrame<T>),
    Skipped(RangeInclusive<u64>),
}

enum Lifecycle<T> {
    Idle,
    Running {
        tx: mpsc::UnboundedSender<Delivery<T>>,
        dispatcher: JoinHandle<()>,
    },
    Stopped,
}

struct GapTimer {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

struct State<T> {
    window: SequenceWindow<T>,
    lifecycle: Lifecycle<T>,
    gap_timer: Option<GapTimer>,
    timer_generation: u64,
}

struct Inner<T> {
    config: BufferConfig,
    state: Mutex<State<T>>,
}

/// Restores sequence order to event frames
///
/// Cloning yields another handle to the same buffer.
pub struct SequencedDeliveryBuffer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SequencedDeliveryBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> SequencedDeliveryBuffer<T> {
    /// Create an idle buffer
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        let window = SequenceWindow::new(config.capacity, config.overflow_policy);
        let window = match config.start {
            SequenceStart::FirstSeen => window,
            SequenceStart::At(sequence) => window.starting_at(sequence),
            SequenceStart::After(sequence) => window.starting_after(sequence),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    window,
                    lifecycle: Lifecycle::Idle,
                    gap_timer: None,
                    timer_generation: 0,
                }),
            }),
        }
    }

    /// Start delivering to `handler`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H>(&self, handler: Arc<H>) -> Result<(), BufferError>
    where
        H: FrameHandler<T> + ?Sized,
    {
        let mut state = self.inner.state.lock();
        if !matches!(state.lifecycle, Lifecycle::Idle) {
            return Err(BufferError::AlreadyStarted);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery<T>>();
        let dispatcher = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Frame(frame) => {
                        let sequence = frame.sequence;
                        if let Err(e) = handler.handle(frame).await {
                            tracing::warn!(sequence, error = %e, "Frame handler failed");
                        }
                    }
                    Delivery::Skipped(missing) => {
                        if let Err(e) = handler.skipped(missing).await {
                            tracing::warn!(error = %e, "Gap handler failed");
                        }
                    }
                }
            }
        });

        state.lifecycle = Lifecycle::Running { tx, dispatcher };
        tracing::debug!(capacity = self.inner.config.capacity, "Delivery buffer started");
        Ok(())
    }

    /// Release all queued state and stop emitting
    ///
    /// Frames already released finish dispatching before this returns.
    pub async fn stop(&self) {
        let dispatcher = {
            let mut state = self.inner.state.lock();
            let discarded = state.window.len();
            state.window.clear();
            if let Some(timer) = state.gap_timer.take() {
                timer.task.abort();
            }

            match std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { tx, dispatcher } => {
                    drop(tx);
                    tracing::debug!(discarded, "Delivery buffer stopped");
                    Some(dispatcher)
                }
                Lifecycle::Idle | Lifecycle::Stopped => None,
            }
        };

        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                tracing::warn!(error = %e, "Frame dispatcher ended abnormally");
            }
        }
    }

    /// Whether the buffer accepts frames
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.inner.state.lock().lifecycle, Lifecycle::Running { .. })
    }

    /// Next sequence the buffer will release without queuing
    #[must_use]
    pub fn expected_sequence(&self) -> Option<u64> {
        self.inner.state.lock().window.expected()
    }

    /// Number of frames waiting on a gap
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().window.len()
    }

    /// Offer a frame
    ///
    /// Only a capacity fault under [`OverflowPolicy::Throw`](super::OverflowPolicy)
    /// is an error; duplicates and stale sequences are reported as outcomes.
    pub fn enqueue(&self, sequence: u64, payload: T) -> Result<EnqueueOutcome, BufferError> {
        let mut state = self.inner.state.lock();
        let tx = match &state.lifecycle {
            Lifecycle::Running { tx, .. } => tx.clone(),
            Lifecycle::Idle | Lifecycle::Stopped => {
                tracing::debug!(sequence, "Frame offered to inactive buffer");
                return Ok(EnqueueOutcome::Inactive);
            }
        };

        let outcome = match state.window.offer(sequence, payload, Instant::now())? {
            Offer::Released(frames) => {
                let released = frames.len() - 1;
                for frame in frames {
                    if tx.send(Delivery::Frame(frame)).is_err() {
                        tracing::warn!(sequence, "Frame dispatcher is gone");
                    }
                }
                EnqueueOutcome::Delivered { released }
            }
            Offer::Queued => {
                tracing::trace!(
                    sequence,
                    expected = ?state.window.expected(),
                    queued = state.window.len(),
                    "Frame queued behind a gap"
                );
                EnqueueOutcome::Queued
            }
            Offer::Duplicate => {
                tracing::trace!(sequence, "Duplicate frame ignored");
                EnqueueOutcome::Duplicate
            }
            Offer::Dropped => {
                tracing::warn!(
                    sequence,
                    capacity = self.inner.config.capacity,
                    "Buffer full, frame dropped"
                );
                EnqueueOutcome::Dropped
            }
        };

        Inner::schedule_gap_timer(&self.inner, &mut state);
        Ok(outcome)
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Keep the gap timer aligned with the oldest queued frame
    fn schedule_gap_timer(inner: &Arc<Self>, state: &mut State<T>) {
        let Some(timeout) = inner.config.gap_timeout else {
            return;
        };

        let Some(oldest) = state.window.oldest_queued_at() else {
            if let Some(timer) = state.gap_timer.take() {
                timer.task.abort();
            }
            return;
        };

        let deadline = oldest + timeout;
        if let Some(timer) = &state.gap_timer {
            if timer.deadline == deadline {
                return;
            }
            timer.task.abort();
        }

        state.timer_generation += 1;
        let generation = state.timer_generation;
        let weak: Weak<Self> = Arc::downgrade(inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                Self::fire_gap_timer(&inner, generation);
            }
        });

        state.gap_timer = Some(GapTimer {
            generation,
            deadline,
            task,
        });
    }

    fn fire_gap_timer(inner: &Arc<Self>, generation: u64) {
        let mut state = inner.state.lock();

        // A frame that filled the gap re-armed or cancelled the timer first
        match &state.gap_timer {
            Some(timer) if timer.generation == generation => {}
            _ => return,
        }
        state.gap_timer = None;

        let tx = match &state.lifecycle {
            Lifecycle::Running { tx, .. } => tx.clone(),
            Lifecycle::Idle | Lifecycle::Stopped => return,
        };

        match inner.config.gap_timeout_policy {
            GapTimeoutPolicy::SkipMissing => {
                let skipped = state.window.skip_missing();
                let mut missing = skipped.missing.into_iter().peekable();
                for frame in skipped.released {
                    while let Some(range) = missing.next_if(|r| *r.end() < frame.sequence) {
                        tracing::warn!(
                            from = *range.start(),
                            to = *range.end(),
                            "Gap timed out, skipping missing sequences"
                        );
                        if tx.send(Delivery::Skipped(range)).is_err() {
                            tracing::warn!("Frame dispatcher is gone");
                        }
                    }
                    if tx.send(Delivery::Frame(frame)).is_err() {
                        tracing::warn!("Frame dispatcher is gone");
                    }
                }
                tracing::debug!(next_expected = ?state.window.expected(), "Gap skip complete");
            }
        }
    }
}

impl<T> std::fmt::Debug for SequencedDeliveryBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SequencedDeliveryBuffer")
            .field("config", &self.inner.config)
            .field("window", &state.window)
            .finish()
    }
}
