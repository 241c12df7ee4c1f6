//! Call session: the state machine that ties greeting, session, capture and
//! playback together
//!
//! Everything that happens to a call (device callbacks, session reports, the
//! greeting worker, playback completions, the user hanging up) arrives as a
//! [`CallEvent`] on one channel. [`CallSession`] consumes them in arrival
//! order on a single dispatch thread and is the only place component state is
//! mutated. The presentation layer talks to it through a [`CallHandle`].
//!
//! Status flow:
//!
//! ```text
//! Idle -> Greeting -> Connecting -> Listening <-> AgentSpeaking
//!   any -> Error (failure), any -> Ended (close or end call)
//! ```

use crate::audio::capture::{CaptureLoop, FrameSource};
use crate::audio::playback::{AudioChunk, FrameSink, PlaybackScheduler};
use crate::call::config::CallConfig;
use crate::call::event::CallEvent;
use crate::call::state::{CallStatus, CallUpdate, SharedCallState};
use crate::greeting::{request_greeting, GreetingSynthesizer};
use crate::messages::{TranscriptAssembler, TranscriptionEntry};
use crate::session::{
    SessionConnector, SessionEvent, SessionEvents, SessionLink, SessionMessage,
};
use crate::{CallError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

/// External capabilities a call is wired to
pub struct CallCollaborators {
    /// Opens the conversational session
    pub connector: Box<dyn SessionConnector>,
    /// Renders the opening line
    pub greeting: Arc<dyn GreetingSynthesizer>,
    /// Microphone
    pub source: Box<dyn FrameSource>,
    /// Speaker
    pub sink: Box<dyn FrameSink>,
}

/// Handle for the presentation layer
///
/// Cheap to clone; every clone talks to the same call.
#[derive(Clone)]
pub struct CallHandle {
    id: Uuid,
    events_tx: Sender<CallEvent>,
    update_rx: Receiver<CallUpdate>,
    state: SharedCallState,
}

impl CallHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Hang up
    pub fn end_call(&self) -> Result<()> {
        self.events_tx
            .send(CallEvent::EndCall)
            .map_err(|e| CallError::Channel(format!("Failed to end call: {}", e)))
    }

    /// Get the shared call state
    pub fn state(&self) -> &SharedCallState {
        &self.state
    }

    pub fn status(&self) -> CallStatus {
        self.state.status()
    }

    pub fn transcript(&self) -> Vec<TranscriptionEntry> {
        self.state.transcript()
    }

    /// Plain-language message set when the microphone could not be acquired
    pub fn permission_error(&self) -> Option<String> {
        self.state.permission_error()
    }

    /// Try to receive an update (non-blocking)
    pub fn try_recv_update(&self) -> Option<CallUpdate> {
        self.update_rx.try_recv().ok()
    }
}

/// A single call and everything it owns
///
/// The session, capture loop and playback scheduler are not `Send` (device
/// streams are pinned to the thread that opened them), so the call is driven
/// on the thread that created it, either with [`run`](Self::run) or one event
/// at a time with [`step`](Self::step).
pub struct CallSession {
    id: Uuid,
    span: Span,
    config: CallConfig,
    state: SharedCallState,

    events_tx: Sender<CallEvent>,
    events_rx: Receiver<CallEvent>,
    update_tx: Sender<CallUpdate>,

    connector: Box<dyn SessionConnector>,
    greeting: Arc<dyn GreetingSynthesizer>,

    link: SessionLink,
    capture: CaptureLoop,
    playback: PlaybackScheduler,
    assembler: TranscriptAssembler,

    connect_requested: bool,
    // The microphone is acquired at most once per call
    capture_requested: bool,
    // Turn finished while agent audio was still playing
    awaiting_drain: bool,
    torn_down: bool,
}

impl CallSession {
    /// Create a call wired to the given collaborators
    ///
    /// Returns the call and a handle for the presentation layer. Nothing
    /// happens until [`start_call`](Self::start_call) or [`run`](Self::run).
    pub fn new(config: CallConfig, collaborators: CallCollaborators) -> Result<(Self, CallHandle)> {
        config.validate()?;

        let id = Uuid::new_v4();
        let span = info_span!("call", call_id = %id);
        let (events_tx, events_rx) = unbounded();
        let (update_tx, update_rx) = bounded(config.update_buffer_size);
        let state = SharedCallState::new(config.max_transcript_entries);

        let capture = CaptureLoop::new(
            collaborators.source,
            config.input_sample_rate,
            config.capture_block_size,
            config.mime_type(),
        );
        let playback = PlaybackScheduler::new(
            collaborators.sink,
            config.output_sample_rate,
            events_tx.clone(),
        );

        let handle = CallHandle {
            id,
            events_tx: events_tx.clone(),
            update_rx,
            state: state.clone(),
        };

        let session = Self {
            id,
            span,
            config,
            state,
            events_tx,
            events_rx,
            update_tx,
            connector: collaborators.connector,
            greeting: collaborators.greeting,
            link: SessionLink::new(),
            capture,
            playback,
            assembler: TranscriptAssembler::new(),
            connect_requested: false,
            capture_requested: false,
            awaiting_drain: false,
            torn_down: false,
        };

        Ok((session, handle))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> CallStatus {
        self.state.status()
    }

    pub fn state(&self) -> &SharedCallState {
        &self.state
    }

    /// Playback scheduler, for inspecting the start cursor
    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    /// Capture loop, for inspecting forwarded frames
    pub fn capture(&self) -> &CaptureLoop {
        &self.capture
    }

    /// Session link, for inspecting held and sent frames
    pub fn link(&self) -> &SessionLink {
        &self.link
    }

    /// Run the call to completion on the current thread
    ///
    /// Starts the call and dispatches events until it has ended.
    pub fn run(mut self) -> Result<()> {
        let span = self.span.clone();
        let _guard = span.enter();

        info!("Call loop starting");
        self.start_call();

        while !self.status().is_terminal() {
            let event = self
                .events_rx
                .recv()
                .map_err(|e| CallError::Channel(format!("Event channel closed: {}", e)))?;
            self.handle_event(event);
        }

        info!("Call loop exiting");
        Ok(())
    }

    /// Dispatch at most one event, waiting up to `timeout` for it
    ///
    /// Returns whether an event was handled.
    pub fn step(&mut self, timeout: Duration) -> Result<bool> {
        let span = self.span.clone();
        let _guard = span.enter();

        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CallError::Channel("Event channel closed".into()))
            }
        }
    }

    /// Leave `Idle`: request the greeting, or connect straight away when
    /// there is none
    pub fn start_call(&mut self) {
        if self.status() != CallStatus::Idle {
            warn!("Call already started ({}), ignoring start", self.status());
            return;
        }

        if self.config.greeting.trim().is_empty() {
            info!("No greeting configured, connecting");
            self.connect();
            return;
        }

        self.set_status(CallStatus::Greeting);
        request_greeting(
            Arc::clone(&self.greeting),
            self.config.greeting.clone(),
            self.config.voice.clone(),
            self.events_tx.clone(),
        );
    }

    /// Hang up and release everything
    pub fn end_call(&mut self) {
        self.set_status(CallStatus::Ended);
        self.teardown();
    }

    fn handle_event(&mut self, event: CallEvent) {
        debug!("Event: {:?}", event);

        match event {
            CallEvent::GreetingReady(result) => self.on_greeting(result),
            CallEvent::Session(event) => self.on_session(event),
            CallEvent::CaptureFrame(samples) => {
                if !self.torn_down {
                    self.capture.forward(&samples, &mut self.link);
                }
            }
            CallEvent::CaptureFailed(reason) => {
                if !self.torn_down {
                    self.capture.stop();
                    self.fail(CallError::CaptureLost(reason));
                }
            }
            CallEvent::PlaybackComplete { chunk_id } => self.on_playback_complete(chunk_id),
            CallEvent::EndCall => {
                info!("End call requested");
                self.end_call();
            }
        }
    }

    fn on_greeting(&mut self, result: Result<String>) {
        if self.torn_down || self.status() != CallStatus::Greeting {
            debug!("Ignoring greeting outside the greeting phase");
            return;
        }

        match result {
            Ok(payload) => {
                if self.playback.enqueue(AudioChunk::greeting(payload)) {
                    self.pump_playback();
                } else {
                    self.connect();
                }
            }
            Err(e) => {
                info!("Greeting unavailable ({}), connecting directly", e);
                self.connect();
            }
        }
    }

    fn on_session(&mut self, event: SessionEvent) {
        match event {
            // The link closes the handle itself if the call is already over
            SessionEvent::Resolved(handle) => {
                debug!("Session handle resolved");
                self.link.resolve(handle);
            }
            _ if self.torn_down => debug!("Ignoring session event after teardown"),
            SessionEvent::Open => self.on_open(),
            SessionEvent::Message(message) => self.on_message(message),
            SessionEvent::Error(reason) => self.fail(CallError::Session(reason)),
            SessionEvent::Close => {
                info!("Session closed by remote");
                self.end_call();
            }
        }
    }

    fn on_open(&mut self) {
        if self.capture_requested {
            debug!("Session reopened, microphone already requested");
            return;
        }
        if self.state.read().has_failed() {
            warn!("Not starting microphone: call has failed");
            return;
        }

        self.capture_requested = true;
        info!("Session open, starting microphone");
        match self.capture.start(self.events_tx.clone()) {
            Ok(()) => self.set_status(CallStatus::Listening),
            Err(e) => self.fail(e),
        }
    }

    fn on_message(&mut self, message: SessionMessage) {
        if let Some(payload) = message.audio_payload() {
            self.set_status(CallStatus::AgentSpeaking);
            if self.playback.enqueue(AudioChunk::speech(payload)) {
                self.pump_playback();
            }
        }

        if let Some(text) = message.output_fragment() {
            self.assembler.push_agent_fragment(text);
        }
        if let Some(text) = message.input_fragment() {
            self.assembler.push_user_fragment(text);
        }

        if message.is_turn_complete() {
            self.complete_turn();
        }
    }

    fn complete_turn(&mut self) {
        let entries = {
            let mut state = self.state.write();
            self.assembler.commit_turn(&mut state.transcript)
        };
        for entry in entries {
            debug!("Transcript: {}: {}", entry.speaker, entry.text);
            self.publish(CallUpdate::TranscriptEntry(entry));
        }

        if self.playback.is_playing() || self.playback.queued() > 0 {
            self.awaiting_drain = true;
        } else {
            self.set_status(CallStatus::Listening);
        }
    }

    fn on_playback_complete(&mut self, chunk_id: u64) {
        if self.torn_down {
            return;
        }

        if let Some(chunk) = self.playback.on_complete(chunk_id) {
            if chunk.is_greeting {
                info!("Greeting finished ({:.2}s)", chunk.duration);
                self.connect();
            }
        }

        self.pump_playback();

        if self.awaiting_drain && !self.playback.is_playing() && self.playback.queued() == 0 {
            self.awaiting_drain = false;
            // A skipped chunk leaves a recoverable Error behind
            let status = self.status();
            if status == CallStatus::AgentSpeaking
                || (status == CallStatus::Error && !self.state.read().has_failed())
            {
                self.set_status(CallStatus::Listening);
            }
        }
    }

    fn pump_playback(&mut self) {
        let report = self.playback.pump();
        for failure in report.failures {
            self.fail(failure);
        }
        if report.greeting_dropped {
            self.connect();
        }
    }

    fn connect(&mut self) {
        if self.connect_requested || self.torn_down {
            return;
        }
        if self.state.read().has_failed() {
            warn!("Not connecting: call has failed");
            return;
        }

        self.connect_requested = true;
        self.set_status(CallStatus::Connecting);

        let events = SessionEvents::new(self.events_tx.clone());
        if let Err(e) = self.connector.connect(&self.config.session_config(), events) {
            self.fail(match e {
                CallError::Connection(_) => e,
                other => CallError::Connection(other.to_string()),
            });
        }
    }

    fn set_status(&self, next: CallStatus) {
        let (previous, changed) = {
            let mut state = self.state.write();
            let previous = state.status;
            (previous, state.transition(next))
        };
        if changed {
            info!("Status: {} -> {}", previous, next);
            self.publish(CallUpdate::StatusChanged(next));
        }
    }

    fn fail(&self, error: CallError) {
        error!("Call error: {}", error);
        let changed = self.state.write().fail(&error);
        self.publish(CallUpdate::Error(error.user_message()));
        if changed {
            self.publish(CallUpdate::StatusChanged(CallStatus::Error));
        }
    }

    fn publish(&self, update: CallUpdate) {
        match self.update_tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => debug!("Update buffer full, dropping {:?}", update),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.awaiting_drain = false;

        self.link.close();
        self.capture.stop();
        self.playback.shutdown();
        info!("Call torn down");
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        let span = self.span.clone();
        let _guard = span.enter();

        self.teardown();
        while let Ok(event) = self.events_rx.try_recv() {
            if let CallEvent::Session(SessionEvent::Resolved(mut handle)) = event {
                debug!("Closing session handle that resolved during disposal");
                handle.close();
            }
        }
    }
}
