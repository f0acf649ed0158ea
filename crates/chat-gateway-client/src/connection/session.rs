//! Session resume bookkeeping
//!
//! The descriptor decides whether the next attempt resumes. It is never
//! persisted; a restarted process always starts fresh.

use parking_lot::Mutex;
use std::sync::Arc;

/// What the client knows about its gateway session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub session_id: Option<String>,
    /// Highest sequence delivered to the application
    pub last_sequence: u64,
}

/// How an attempt should open its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectMode {
    Fresh,
    Resume {
        session_id: String,
        last_sequence: u64,
    },
}

impl ConnectMode {
    #[must_use]
    pub const fn is_resume(&self) -> bool {
        matches!(self, Self::Resume { .. })
    }
}

/// How an attempt reached ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReady {
    /// Hello assigned a new session
    Fresh { session_id: String },
    /// The server acknowledged a resume
    Resumed { session_id: String },
}

impl SessionReady {
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Fresh { session_id } | Self::Resumed { session_id } => session_id,
        }
    }

    #[must_use]
    pub const fn is_resumed(&self) -> bool {
        matches!(self, Self::Resumed { .. })
    }
}

#[derive(Debug)]
struct SessionTracker {
    descriptor: SessionDescriptor,
    /// Resume attempts that ended before ready, in a row
    resume_failures: u32,
    max_resume_attempts: u32,
}

/// Shared handle to the session descriptor
///
/// Created by the connection manager and cloned into every attempt so the
/// delivery path can advance the last sequence across reconnects.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tracker: Arc<Mutex<SessionTracker>>,
}

impl SessionHandle {
    pub(crate) fn new(max_resume_attempts: u32) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(SessionTracker {
                descriptor: SessionDescriptor::default(),
                resume_failures: 0,
                max_resume_attempts,
            })),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionDescriptor {
        self.tracker.lock().descriptor.clone()
    }

    /// Record a delivered sequence; the descriptor never moves backwards
    pub fn advance(&self, sequence: u64) {
        let mut tracker = self.tracker.lock();
        if sequence > tracker.descriptor.last_sequence {
            tracker.descriptor.last_sequence = sequence;
        }
    }

    /// Decide how the next attempt opens its session
    pub(crate) fn plan(&self) -> ConnectMode {
        let mut tracker = self.tracker.lock();

        if tracker.resume_failures >= tracker.max_resume_attempts {
            if tracker.descriptor.session_id.is_some() {
                tracing::info!(
                    failures = tracker.resume_failures,
                    "Resume attempts exhausted, starting a fresh session"
                );
            }
            tracker.descriptor = SessionDescriptor::default();
            tracker.resume_failures = 0;
            return ConnectMode::Fresh;
        }

        match &tracker.descriptor.session_id {
            Some(session_id) => ConnectMode::Resume {
                session_id: session_id.clone(),
                last_sequence: tracker.descriptor.last_sequence,
            },
            None => ConnectMode::Fresh,
        }
    }

    pub(crate) fn record_ready(&self, ready: &SessionReady) {
        let mut tracker = self.tracker.lock();
        tracker.resume_failures = 0;
        match ready {
            SessionReady::Fresh { session_id } | SessionReady::Resumed { session_id } => {
                tracker.descriptor.session_id = Some(session_id.clone());
            }
        }
    }

    /// Start counting sequences for a new session
    ///
    /// Called by the transport before any event of the session is delivered,
    /// so progress made before `record_ready` is kept.
    pub(crate) fn begin(&self, session_id: &str) {
        let mut tracker = self.tracker.lock();
        tracker.descriptor = SessionDescriptor {
            session_id: Some(session_id.to_string()),
            last_sequence: 0,
        };
    }

    pub(crate) fn record_resume_failure(&self) {
        let mut tracker = self.tracker.lock();
        tracker.resume_failures = tracker.resume_failures.saturating_add(1);
    }

    pub(crate) fn clear(&self) {
        let mut tracker = self.tracker.lock();
        tracker.descriptor = SessionDescriptor::default();
        tracker.resume_failures = 0;
    }
}
