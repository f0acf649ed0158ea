//! Ordering core of the delivery buffer
//!
//! `SequenceWindow` is synchronous and knows nothing about tasks or channels;
//! the caller provides the clock and forwards whatever it releases.

use super::{BufferError, OverflowPolicy};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tokio::time::Instant;

/// A frame released in sequence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedFrame<T> {
    pub sequence: u64,
    pub payload: T,
}

/// What the window did with an offered frame
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    /// The frame and every queued frame it unblocked, ascending
    Released(Vec<OrderedFrame<T>>),
    Queued,
    /// Below the expected sequence, or already queued
    Duplicate,
    /// Full under [`OverflowPolicy::DropIncoming`]
    Dropped,
}

/// Frames released by abandoning a gap
#[derive(Debug, PartialEq, Eq)]
pub struct Skipped<T> {
    /// Sequences that will never be delivered, ascending
    pub missing: Vec<RangeInclusive<u64>>,
    pub released: Vec<OrderedFrame<T>>,
}

struct Pending<T> {
    payload: T,
    queued_at: Instant,
}

/// Sequence-keyed reorder window
pub struct SequenceWindow<T> {
    capacity: usize,
    overflow_policy: OverflowPolicy,
    /// Unset until the first frame establishes the baseline
    expected: Option<u64>,
    /// `u64::MAX` was released; no sequence can follow it
    exhausted: bool,
    pending: BTreeMap<u64, Pending<T>>,
    /// Queued frames by arrival, oldest first
    arrivals: BTreeSet<(Instant, u64)>,
}

impl<T> SequenceWindow<T> {
    #[must_use]
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow_policy,
            expected: None,
            exhausted: false,
            pending: BTreeMap::new(),
            arrivals: BTreeSet::new(),
        }
    }

    /// Start from a known sequence instead of the first frame seen
    #[must_use]
    pub fn starting_at(mut self, sequence: u64) -> Self {
        self.expected = Some(sequence);
        self.exhausted = false;
        self
    }

    /// Start just past a sequence that was already delivered
    #[must_use]
    pub fn starting_after(mut self, sequence: u64) -> Self {
        self.advance_past(sequence);
        self
    }

    /// Next sequence accepted without queuing
    ///
    /// `None` before the baseline is known and after `u64::MAX` is released.
    #[must_use]
    pub fn expected(&self) -> Option<u64> {
        if self.exhausted {
            None
        } else {
            self.expected
        }
    }

    /// Whether the whole sequence space has been consumed
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of frames waiting for a gap to fill
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Offer a frame; a capacity fault leaves the window untouched
    pub fn offer(&mut self, sequence: u64, payload: T, now: Instant) -> Result<Offer<T>, BufferError> {
        if self.exhausted {
            return Ok(Offer::Duplicate);
        }
        let expected = *self.expected.get_or_insert(sequence);

        if sequence < expected {
            return Ok(Offer::Duplicate);
        }

        if sequence == expected {
            let mut released = vec![OrderedFrame { sequence, payload }];
            let mut last = sequence;
            while let Some(next) = last.checked_add(1) {
                let Some(frame) = self.take(next) else {
                    break;
                };
                released.push(frame);
                last = next;
            }
            self.advance_past(last);
            return Ok(Offer::Released(released));
        }

        if self.pending.contains_key(&sequence) {
            return Ok(Offer::Duplicate);
        }

        if self.pending.len() >= self.capacity {
            return match self.overflow_policy {
                OverflowPolicy::DropIncoming => Ok(Offer::Dropped),
                OverflowPolicy::Throw => Err(BufferError::CapacityExceeded {
                    sequence,
                    capacity: self.capacity,
                }),
            };
        }

        self.pending.insert(
            sequence,
            Pending {
                payload,
                queued_at: now,
            },
        );
        self.arrivals.insert((now, sequence));
        Ok(Offer::Queued)
    }

    /// Arrival time of the longest-waiting queued frame
    #[must_use]
    pub fn oldest_queued_at(&self) -> Option<Instant> {
        self.arrivals.first().map(|(queued_at, _)| *queued_at)
    }

    /// Release everything queued, abandoning the missing numbers
    ///
    /// The expected sequence moves to one past the last released frame.
    pub fn skip_missing(&mut self) -> Skipped<T> {
        self.arrivals.clear();
        let released: Vec<_> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(sequence, pending)| OrderedFrame {
                sequence,
                payload: pending.payload,
            })
            .collect();

        // Queued frames always sit above `expected`, so each gap is non-empty
        let mut missing = Vec::new();
        let mut from = self.expected;
        for frame in &released {
            if let Some(start) = from {
                if start < frame.sequence {
                    missing.push(start..=frame.sequence - 1);
                }
            }
            from = frame.sequence.checked_add(1);
        }

        if let Some(last) = released.last() {
            self.advance_past(last.sequence);
        }
        Skipped { missing, released }
    }

    /// Drop all queued frames
    pub fn clear(&mut self) {
        self.pending.clear();
        self.arrivals.clear();
    }

    fn take(&mut self, sequence: u64) -> Option<OrderedFrame<T>> {
        let pending = self.pending.remove(&sequence)?;
        self.arrivals.remove(&(pending.queued_at, sequence));
        Some(OrderedFrame {
            sequence,
            payload: pending.payload,
        })
    }

    fn advance_past(&mut self, sequence: u64) {
        match sequence.checked_add(1) {
            Some(next) => self.expected = Some(next),
            None => {
                self.expected = Some(u64::MAX);
                self.exhausted = true;
            }
        }
    }
}

impl<T> std::fmt::Debug for SequenceWindow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceWindow")
            .field("capacity", &self.capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("expected", &self.expected)
            .field("pending", &self.pending.len())
            .finish()
    }
}
