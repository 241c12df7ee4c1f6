use crate::session::{
    MediaFrame, SessionConfig, SessionConnector, SessionEvents, SessionHandle, SessionMessage,
};
use crate::sim::tone_payload;
use crate::{CallError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// One thing the scripted agent does
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Wait before the next step
    Pause(Duration),
    /// Deliver an inbound message
    Message(SessionMessage),
    /// Report a session error
    Error(String),
    /// Close from the remote side
    Close,
}

/// What the simulated remote side observed
#[derive(Debug, Default)]
struct TapState {
    connects: usize,
    config: Option<SessionConfig>,
    frames: Vec<MediaFrame>,
    closes: usize,
}

/// Read-only view of a scripted session, shared with the connector
#[derive(Clone, Debug, Default)]
pub struct SessionTap {
    inner: Arc<Mutex<TapState>>,
}

impl SessionTap {
    /// Number of connect attempts
    pub fn connects(&self) -> usize {
        self.inner.lock().connects
    }

    /// Config passed to the last connect
    pub fn config(&self) -> Option<SessionConfig> {
        self.inner.lock().config.clone()
    }

    /// Media frames received so far, in order
    pub fn frames(&self) -> Vec<MediaFrame> {
        self.inner.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Times a handle was closed
    pub fn closes(&self) -> usize {
        self.inner.lock().closes
    }
}

struct ScriptedHandle {
    tap: SessionTap,
    closed: bool,
}

impl SessionHandle for ScriptedHandle {
    fn send_media(&mut self, frame: MediaFrame) -> Result<()> {
        if self.closed {
            return Err(CallError::Session("Session is closed".into()));
        }
        self.tap.inner.lock().frames.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tap.inner.lock().closes += 1;
        }
    }
}

/// Connector that replays a fixed script on a background thread
///
/// After `connect` it waits for the connect delay, resolves a handle, opens
/// the session and then runs the script steps in order.
#[derive(Clone)]
pub struct ScriptedConnector {
    connect_delay: Duration,
    steps: Vec<ScriptStep>,
    resolve: bool,
    tap: SessionTap,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(50),
            steps: Vec::new(),
            resolve: true,
            tap: SessionTap::default(),
        }
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Never resolve or open; the connect hangs until the call is torn down
    pub fn never_resolving(mut self) -> Self {
        self.resolve = false;
        self
    }

    pub fn with_step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_pause(self, pause: Duration) -> Self {
        self.with_step(ScriptStep::Pause(pause))
    }

    pub fn with_message(self, message: SessionMessage) -> Self {
        self.with_step(ScriptStep::Message(message))
    }

    /// A full exchange: the user's words, the agent's audio in chunks and
    /// its words, then the turn boundary
    pub fn with_agent_turn(
        mut self,
        user_text: &str,
        agent_text: &str,
        audio_chunks: usize,
        chunk_seconds: f64,
        sample_rate: u32,
    ) -> Self {
        self = self.with_message(SessionMessage::input_transcript(user_text));
        for i in 0..audio_chunks {
            let frequency = 300.0 + 40.0 * i as f32;
            self = self.with_message(SessionMessage::audio(tone_payload(
                chunk_seconds,
                sample_rate,
                frequency,
            )));
        }
        for word in agent_text.split_inclusive(' ') {
            self = self.with_message(SessionMessage::output_transcript(word));
        }
        self.with_message(SessionMessage::turn_complete())
    }

    pub fn with_remote_close(self) -> Self {
        self.with_step(ScriptStep::Close)
    }

    /// Observer for what the remote side received
    pub fn tap(&self) -> SessionTap {
        self.tap.clone()
    }
}

impl SessionConnector for ScriptedConnector {
    fn connect(&self, config: &SessionConfig, events: SessionEvents) -> Result<()> {
        {
            let mut state = self.tap.inner.lock();
            state.connects += 1;
            state.config = Some(config.clone());
        }
        info!("Simulated session connecting (voice {})", config.voice);

        if !self.resolve {
            return Ok(());
        }

        let delay = self.connect_delay;
        let steps = self.steps.clone();
        let tap = self.tap.clone();

        thread::Builder::new()
            .name("scripted-session".into())
            .spawn(move || {
                thread::sleep(delay);
                events.resolved(Box::new(ScriptedHandle { tap, closed: false }));
                events.open();

                for step in steps {
                    match step {
                        ScriptStep::Pause(pause) => thread::sleep(pause),
                        ScriptStep::Message(message) => events.message(message),
                        ScriptStep::Error(reason) => events.error(reason),
                        ScriptStep::Close => events.close(),
                    }
                }
                debug!("Simulated session script finished");
            })
            .map_err(|e| CallError::Connection(format!("Failed to spawn session thread: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallEvent;
    use crate::session::SessionEvent;
    use crossbeam_channel::unbounded;

    fn config() -> SessionConfig {
        SessionConfig {
            system_prompt: "Be brief".into(),
            voice: "Puck".into(),
        }
    }

    #[test]
    fn test_script_replays_in_order() {
        let connector = ScriptedConnector::new()
            .with_connect_delay(Duration::ZERO)
            .with_agent_turn("hi", "hello there", 2, 0.1, 24_000)
            .with_remote_close();
        let tap = connector.tap();
        let (tx, rx) = unbounded();

        connector.connect(&config(), SessionEvents::new(tx)).unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(1)) {
            let CallEvent::Session(event) = event else {
                panic!("unexpected event");
            };
            let done = matches!(event, SessionEvent::Close);
            kinds.push(match event {
                SessionEvent::Resolved(_) => "resolved",
                SessionEvent::Open => "open",
                SessionEvent::Message(m) if m.audio_payload().is_some() => "audio",
                SessionEvent::Message(m) if m.is_turn_complete() => "turn",
                SessionEvent::Message(_) => "text",
                SessionEvent::Error(_) => "error",
                SessionEvent::Close => "close",
            });
            if done {
                break;
            }
        }

        assert_eq!(
            kinds,
            vec!["resolved", "open", "text", "audio", "audio", "text", "text", "turn", "close"]
        );
        assert_eq!(tap.connects(), 1);
        assert_eq!(tap.config(), Some(config()));
    }

    #[test]
    fn test_handle_records_frames_until_closed() {
        let tap = SessionTap::default();
        let mut handle = ScriptedHandle {
            tap: tap.clone(),
            closed: false,
        };

        handle
            .send_media(MediaFrame::new("AAA=", "audio/pcm;rate=16000"))
            .unwrap();
        handle.close();
        handle.close();

        assert!(handle
            .send_media(MediaFrame::new("BBB=", "audio/pcm;rate=16000"))
            .is_err());
        assert_eq!(tap.frame_count(), 1);
        assert_eq!(tap.closes(), 1);
    }

    #[test]
    fn test_never_resolving_connector_stays_silent() {
        let connector = ScriptedConnector::new().never_resolving();
        let (tx, rx) = unbounded();
        connector.connect(&config(), SessionEvents::new(tx)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(connector.tap().connects(), 1);
    }
}
