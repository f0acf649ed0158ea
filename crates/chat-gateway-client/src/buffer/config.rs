//! Buffer configuration

use chat_common::{BufferSettings, OverflowSetting};
use std::time::Duration;

/// What happens to an out-of-order frame when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming frame, leaving the buffer untouched
    DropIncoming,
    /// Fail the enqueue call with [`BufferError::CapacityExceeded`](super::BufferError)
    #[default]
    Throw,
}

/// What happens when a gap outlives the gap timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapTimeoutPolicy {
    /// Emit everything queued and give up on the missing numbers
    #[default]
    SkipMissing,
}

/// Where the buffer's sequence numbering begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceStart {
    /// Take the baseline from the first frame offered
    #[default]
    FirstSeen,
    /// Release this sequence first
    At(u64),
    /// Everything up to and including this sequence was already delivered
    After(u64),
}

/// Sequenced delivery buffer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum number of out-of-order frames held at once
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// `None` tolerates gaps until they are filled
    pub gap_timeout: Option<Duration>,
    /// Only consulted when `gap_timeout` is set
    pub gap_timeout_policy: GapTimeoutPolicy,
    pub start: SequenceStart,
}

impl BufferConfig {
    /// Default capacity
    pub const DEFAULT_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    #[must_use]
    pub fn with_initial_sequence(mut self, sequence: u64) -> Self {
        self.start = SequenceStart::At(sequence);
        self
    }

    /// Treat every sequence up to `sequence` as already delivered
    #[must_use]
    pub fn with_delivered_through(mut self, sequence: u64) -> Self {
        self.start = SequenceStart::After(sequence);
        self
    }

    #[must_use]
    pub fn with_gap_timeout(mut self, timeout: Duration) -> Self {
        self.gap_timeout = Some(timeout);
        self
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            gap_timeout: None,
            gap_timeout_policy: GapTimeoutPolicy::default(),
            start: SequenceStart::FirstSeen,
        }
    }
}

impl From<&BufferSettings> for BufferConfig {
    fn from(settings: &BufferSettings) -> Self {
        Self {
            capacity: settings.capacity,
            overflow_policy: match settings.overflow {
                OverflowSetting::Drop => OverflowPolicy::DropIncoming,
                OverflowSetting::Throw => OverflowPolicy::Throw,
            },
            gap_timeout: settings.gap_timeout_ms.map(Duration::from_millis),
            gap_timeout_policy: GapTimeoutPolicy::SkipMissing,
            start: SequenceStart::FirstSeen,
        }
    }
}
