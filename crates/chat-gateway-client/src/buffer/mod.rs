//! Sequenced event delivery
//!
//! Restores total order to event frames that may arrive reordered,
//! duplicated, or with gaps.

mod config;
mod sequenced;
mod window;

pub use config::{BufferConfig, GapTimeoutPolicy, OverflowPolicy, SequenceStart};
pub use sequenced::{FrameHandler, SequencedDeliveryBuffer};
pub use window::{Offer, OrderedFrame, SequenceWindow, Skipped};

use thiserror::Error;

/// Buffer error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer is full and configured to refuse
    #[error("Buffer capacity exceeded: cannot queue sequence {sequence} (capacity {capacity})")]
    CapacityExceeded { sequence: u64, capacity: usize },

    /// `start` was called twice
    #[error("Buffer already started")]
    AlreadyStarted,
}

/// Result of a single enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame was emitted, followed by this many queued frames it released
    Delivered { released: usize },
    /// The frame is waiting for a lower sequence
    Queued,
    /// Already delivered, skipped, or already queued
    Duplicate,
    /// The buffer was full and the policy dropped the frame
    Dropped,
    /// The buffer is not running
    Inactive,
}

impl EnqueueOutcome {
    /// Whether the frame will be (or was) handed to the handler
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Queued)
    }
}
