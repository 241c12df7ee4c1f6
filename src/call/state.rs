//! Call status and the state shared with the presentation layer
//!
//! The dispatch loop is the only writer. The presentation layer reads
//! through [`SharedCallState`] and gets change notifications as
//! [`CallUpdate`]s.

use crate::messages::{Transcript, TranscriptionEntry};
use crate::CallError;
use parking_lot::RwLock;
use std::sync::Arc;

/// Human-readable call status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallStatus {
    /// Not started
    #[default]
    Idle,
    /// Rendering and playing the opening line
    Greeting,
    /// Waiting for the session to open
    Connecting,
    /// Microphone live, waiting for the agent
    Listening,
    /// Agent audio is playing
    AgentSpeaking,
    /// Agent is preparing a reply
    Thinking,
    /// Something went wrong
    Error,
    /// Call is over
    Ended,
}

impl CallStatus {
    /// Check if the call is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStatus::Idle => write!(f, "Idle"),
            CallStatus::Greeting => write!(f, "Greeting"),
            CallStatus::Connecting => write!(f, "Connecting"),
            CallStatus::Listening => write!(f, "Listening"),
            CallStatus::AgentSpeaking => write!(f, "Agent speaking"),
            CallStatus::Thinking => write!(f, "Thinking"),
            CallStatus::Error => write!(f, "Error"),
            CallStatus::Ended => write!(f, "Ended"),
        }
    }
}

/// Notification for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum CallUpdate {
    /// Status moved
    StatusChanged(CallStatus),
    /// A transcript entry was committed
    TranscriptEntry(TranscriptionEntry),
    /// A failure was surfaced (plain-language message)
    Error(String),
}

/// State of a single call
#[derive(Clone, Debug)]
pub struct CallState {
    /// Current status
    pub status: CallStatus,
    /// Committed transcript
    pub transcript: Transcript,
    /// Plain-language message for a microphone failure
    pub permission_error: Option<String>,
    /// Last error, for diagnostics
    pub last_error: Option<String>,
    /// Set after a non-recoverable failure; only `Ended` may follow
    failed: bool,
}

impl CallState {
    pub fn new(max_transcript_entries: usize) -> Self {
        Self {
            status: CallStatus::Idle,
            transcript: Transcript::new(max_transcript_entries),
            permission_error: None,
            last_error: None,
            failed: false,
        }
    }

    /// Move to `next` if the transition is allowed
    ///
    /// `Idle` is never re-entered, nothing leaves `Ended`, and after a
    /// non-recoverable failure only `Ended` is accepted. Returns whether the
    /// status changed.
    pub fn transition(&mut self, next: CallStatus) -> bool {
        if self.status == next || self.status.is_terminal() || next == CallStatus::Idle {
            return false;
        }
        if self.failed && next != CallStatus::Ended {
            return false;
        }
        self.status = next;
        true
    }

    /// Record a failure and move to `Error`
    ///
    /// Returns whether the status changed.
    pub fn fail(&mut self, error: &CallError) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.last_error = Some(error.to_string());
        if let CallError::Permission(_) | CallError::CaptureLost(_) = error {
            self.permission_error = Some(error.user_message());
        }
        if !error.is_recoverable() {
            self.failed = true;
        }
        let changed = self.status != CallStatus::Error;
        self.status = CallStatus::Error;
        changed
    }

    /// Whether a non-recoverable failure has happened
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Create an immutable snapshot of current state
    pub fn snapshot(&self) -> CallStateSnapshot {
        CallStateSnapshot {
            status: self.status,
            transcript: self.transcript.entries(),
            permission_error: self.permission_error.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Immutable snapshot of call state
#[derive(Clone, Debug)]
pub struct CallStateSnapshot {
    pub status: CallStatus,
    pub transcript: Vec<TranscriptionEntry>,
    pub permission_error: Option<String>,
    pub last_error: Option<String>,
}

/// Thread-safe shared call state
#[derive(Clone)]
pub struct SharedCallState {
    inner: Arc<RwLock<CallState>>,
}

impl SharedCallState {
    pub fn new(max_transcript_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CallState::new(max_transcript_entries))),
        }
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, CallState> {
        self.inner.read()
    }

    /// Get a write lock on the state
    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, CallState> {
        self.inner.write()
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> CallStateSnapshot {
        self.inner.read().snapshot()
    }

    pub fn status(&self) -> CallStatus {
        self.inner.read().status
    }

    pub fn transcript(&self) -> Vec<TranscriptionEntry> {
        self.inner.read().transcript.entries()
    }

    pub fn permission_error(&self) -> Option<String> {
        self.inner.read().permission_error.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }
}
