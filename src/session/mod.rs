//! Contract with the remote conversational session
//!
//! The session itself (transport, auth, protocol) lives outside this crate.
//! A [`SessionConnector`] starts connecting and reports everything that
//! happens afterwards through [`SessionEvents`]: the resolved handle, open,
//! inbound messages, errors and close. All of it lands on the call's event
//! channel and is handled on the dispatch thread.

pub mod message;

pub use message::{MediaFrame, SessionMessage};

use crate::call::CallEvent;
use crate::Result;
use crossbeam_channel::{SendError, Sender};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

/// Parameters for opening a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Persona / behaviour instructions for the agent
    pub system_prompt: String,

    /// Voice selector for the agent's speech
    pub voice: String,
}

/// Starts a session
pub trait SessionConnector {
    /// Begin connecting
    ///
    /// Must not block until the session is up. An `Err` means the attempt
    /// could not even be started; everything later is reported via `events`.
    fn connect(&self, config: &SessionConfig, events: SessionEvents) -> Result<()>;
}

/// Live session handle
pub trait SessionHandle: Send {
    /// Send one media frame without waiting for acknowledgment
    fn send_media(&mut self, frame: MediaFrame) -> Result<()>;

    /// Close the session
    fn close(&mut self);
}

/// Something the session reported
pub enum SessionEvent {
    /// Connect finished and produced a handle
    Resolved(Box<dyn SessionHandle>),
    /// Session is ready for media
    Open,
    /// Inbound message
    Message(SessionMessage),
    /// Session-level error
    Error(String),
    /// Session closed by the remote side
    Close,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Resolved(_) => write!(f, "Resolved(..)"),
            SessionEvent::Open => write!(f, "Open"),
            SessionEvent::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
            SessionEvent::Error(err) => f.debug_tuple("Error").field(err).finish(),
            SessionEvent::Close => write!(f, "Close"),
        }
    }
}

/// Callback surface handed to a connector
///
/// Each method posts onto the call's event channel. Once the call is gone
/// the reports are silently dropped.
#[derive(Clone, Debug)]
pub struct SessionEvents {
    events: Sender<CallEvent>,
}

impl SessionEvents {
    pub(crate) fn new(events: Sender<CallEvent>) -> Self {
        Self { events }
    }

    fn post(&self, event: SessionEvent) {
        match self.events.send(CallEvent::Session(event)) {
            Ok(()) => {}
            Err(SendError(CallEvent::Session(SessionEvent::Resolved(mut handle)))) => {
                info!("Session resolved after the call was gone, closing it");
                handle.close();
            }
            Err(_) => debug!("Session event dropped: call is gone"),
        }
    }

    /// The connect operation produced a handle
    pub fn resolved(&self, handle: Box<dyn SessionHandle>) {
        self.post(SessionEvent::Resolved(handle));
    }

    pub fn open(&self) {
        self.post(SessionEvent::Open);
    }

    pub fn message(&self, message: SessionMessage) {
        self.post(SessionEvent::Message(message));
    }

    /// Parse and forward a raw JSON message
    ///
    /// Unparseable messages are logged and skipped.
    pub fn message_json(&self, json: &str) {
        match SessionMessage::from_json(json) {
            Ok(message) => self.message(message),
            Err(e) => warn!("Ignoring malformed session message: {}", e),
        }
    }

    pub fn error(&self, error: impl Into<String>) {
        self.post(SessionEvent::Error(error.into()));
    }

    pub fn close(&self) {
        self.post(SessionEvent::Close);
    }
}

/// The call's side of the session: the handle once it resolves, plus frames
/// captured before it did
///
/// Frames are sent in capture order. After [`close`](Self::close), a handle
/// that resolves late is closed on arrival.
#[derive(Default)]
pub struct SessionLink {
    handle: Option<Box<dyn SessionHandle>>,
    pending: VecDeque<MediaFrame>,
    closed: bool,
    sent: u64,
    send_failures: u64,
}

impl SessionLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the resolved handle and flush held frames
    pub fn resolve(&mut self, mut handle: Box<dyn SessionHandle>) {
        if self.closed {
            info!("Session resolved after teardown, closing it");
            handle.close();
            return;
        }
        if self.handle.is_some() {
            warn!("Session resolved twice, closing the extra handle");
            handle.close();
            return;
        }

        self.handle = Some(handle);
        if !self.pending.is_empty() {
            debug!("Flushing {} held media frames", self.pending.len());
        }
        while let Some(frame) = self.pending.pop_front() {
            self.deliver(frame);
        }
    }

    /// Send a frame, or hold it until the handle resolves
    pub fn send(&mut self, frame: MediaFrame) {
        if self.closed {
            return;
        }
        if self.handle.is_some() {
            self.deliver(frame);
        } else {
            self.pending.push_back(frame);
        }
    }

    fn deliver(&mut self, frame: MediaFrame) {
        if let Some(handle) = self.handle.as_mut() {
            match handle.send_media(frame) {
                Ok(()) => self.sent += 1,
                Err(e) => {
                    self.send_failures += 1;
                    debug!("Media frame send failed: {}", e);
                }
            }
        }
    }

    /// Close the handle exactly once
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            info!(
                "Session closed ({} frames sent, {} failed)",
                self.sent, self.send_failures
            );
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Frames waiting for the handle
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
