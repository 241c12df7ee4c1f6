//! Microphone capture-and-forward loop
//!
//! The frame source delivers fixed-size blocks of normalized samples from the
//! device thread. Each block is posted to the call's event channel, and on
//! the dispatch thread it is converted to PCM16, base64-encoded, tagged with
//! the mime type and forwarded to the session without waiting for an ack.

use crate::audio::codec::encode_pcm16_le;
use crate::audio::transcode;
use crate::call::CallEvent;
use crate::session::{MediaFrame, SessionLink};
use crate::{CallError, Result};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Device-level capture capability
pub trait FrameSource {
    /// Acquire the input device and start delivering blocks of
    /// `block_size` mono samples at `sample_rate` through `frames`
    ///
    /// An error here means the device could not be acquired (denied,
    /// missing or busy).
    fn start(&mut self, sample_rate: u32, block_size: usize, frames: FrameSender) -> Result<()>;

    /// Stop delivering frames and release the device
    fn stop(&mut self);
}

/// Handle a frame source uses to deliver captured blocks
///
/// Cheap to clone and safe to move into a device callback.
#[derive(Clone, Debug)]
pub struct FrameSender {
    events: Sender<CallEvent>,
    active: Arc<AtomicBool>,
}

impl FrameSender {
    /// Deliver a captured block
    ///
    /// Returns false once capture has been stopped; the block is dropped.
    pub fn send(&self, samples: Vec<f32>) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        self.events.send(CallEvent::CaptureFrame(samples)).is_ok()
    }

    /// Report that the device failed after it was started
    pub fn fail(&self, reason: impl Into<String>) {
        if self.active.load(Ordering::SeqCst) {
            let _ = self.events.send(CallEvent::CaptureFailed(reason.into()));
        }
    }

    /// Whether the call still accepts frames
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Capture loop state: owns the frame source for the call's lifetime
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    sample_rate: u32,
    block_size: usize,
    mime_type: String,
    active: Arc<AtomicBool>,
    started: bool,
    frames_forwarded: u64,
}

impl CaptureLoop {
    /// Create a capture loop around an idle frame source
    pub fn new(
        source: Box<dyn FrameSource>,
        sample_rate: u32,
        block_size: usize,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sample_rate,
            block_size,
            mime_type: mime_type.into(),
            active: Arc::new(AtomicBool::new(false)),
            started: false,
            frames_forwarded: 0,
        }
    }

    /// Acquire the frame source and begin accepting frames
    ///
    /// Acquisition failures come back as [`CallError::Permission`]. Starting
    /// twice is a no-op.
    pub fn start(&mut self, events: Sender<CallEvent>) -> Result<()> {
        if self.started {
            warn!("Capture already started, ignoring start request");
            return Ok(());
        }

        self.active.store(true, Ordering::SeqCst);
        let frames = FrameSender {
            events,
            active: Arc::clone(&self.active),
        };

        match self.source.start(self.sample_rate, self.block_size, frames) {
            Ok(()) => {
                self.started = true;
                info!(
                    "Capture started: {} Hz, {} samples per frame",
                    self.sample_rate, self.block_size
                );
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(match e {
                    CallError::Permission(_) => e,
                    other => CallError::Permission(other.to_string()),
                })
            }
        }
    }

    /// Encode one captured block into an outbound media frame
    ///
    /// Returns `None` once capture has been stopped.
    pub fn encode_frame(&self, samples: &[f32]) -> Option<MediaFrame> {
        if !self.is_active() {
            return None;
        }
        let bytes = encode_pcm16_le(samples);
        Some(MediaFrame::new(transcode::encode(&bytes), self.mime_type.clone()))
    }

    /// Encode a block and hand it to the session (fire-and-forget)
    pub fn forward(&mut self, samples: &[f32], link: &mut SessionLink) {
        let Some(frame) = self.encode_frame(samples) else {
            debug!("Dropping {} captured samples: capture stopped", samples.len());
            return;
        };
        link.send(frame);
        self.frames_forwarded += 1;
    }

    /// Whether frames are currently accepted
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of frames handed to the session so far
    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded
    }

    /// Stop accepting frames and release the device
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if self.started {
            self.source.stop();
            self.started = false;
            info!(
                "Capture stopped after {} frames",
                self.frames_forwarded
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct SourceLog {
        started_with: Option<(u32, usize)>,
        sender: Option<FrameSender>,
        stopped: usize,
    }

    struct FakeSource {
        log: Arc<Mutex<SourceLog>>,
        deny: bool,
    }

    impl FrameSource for FakeSource {
        fn start(&mut self, sample_rate: u32, block_size: usize, frames: FrameSender) -> Result<()> {
            if self.deny {
                return Err(CallError::Permission("NotAllowedError".into()));
            }
            let mut log = self.log.lock();
            log.started_with = Some((sample_rate, block_size));
            log.sender = Some(frames);
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().stopped += 1;
        }
    }

    fn capture(deny: bool) -> (CaptureLoop, Arc<Mutex<SourceLog>>) {
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let source = FakeSource {
            log: Arc::clone(&log),
            deny,
        };
        (
            CaptureLoop::new(Box::new(source), 16_000, 4096, "audio/pcm;rate=16000"),
            log,
        )
    }

    #[test]
    fn test_start_binds_rate_and_block_size() {
        let (mut capture, log) = capture(false);
        let (tx, _rx) = unbounded();
        capture.start(tx).unwrap();

        assert!(capture.is_active());
        assert_eq!(log.lock().started_with, Some((16_000, 4096)));
    }

    #[test]
    fn test_denied_source_is_permission_error() {
        let (mut capture, _) = capture(true);
        let (tx, _rx) = unbounded();
        let err = capture.start(tx).unwrap_err();

        assert!(matches!(err, CallError::Permission(_)));
        assert!(!capture.is_active());
    }

    #[test]
    fn test_encode_frame_wire_format() {
        let (mut capture, _) = capture(false);
        let (tx, _rx) = unbounded();
        capture.start(tx).unwrap();

        let frame = capture.encode_frame(&[1.0, -1.0]).unwrap();
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(
            transcode::decode(&frame.data).unwrap(),
            vec![0xFF, 0x7F, 0x01, 0x80]
        );
    }

    #[test]
    fn test_frames_flow_through_event_channel() {
        let (mut capture, log) = capture(false);
        let (tx, rx) = unbounded();
        capture.start(tx).unwrap();

        let sender = log.lock().sender.clone().unwrap();
        assert!(sender.send(vec![0.1; 4]));
        assert!(matches!(rx.try_recv(), Ok(CallEvent::CaptureFrame(s)) if s.len() == 4));
    }

    #[test]
    fn test_stop_rejects_late_frames() {
        let (mut capture, log) = capture(false);
        let (tx, rx) = unbounded();
        capture.start(tx).unwrap();
        let sender = log.lock().sender.clone().unwrap();

        capture.stop();
        capture.stop();

        assert_eq!(log.lock().stopped, 1);
        assert!(!sender.send(vec![0.0; 4]));
        assert!(rx.try_recv().is_err());
        assert!(capture.encode_frame(&[0.0]).is_none());
    }

    #[test]
    fn test_stop_before_start_does_not_touch_source() {
        let (mut capture, log) = capture(false);
        capture.stop();
        assert_eq!(log.lock().stopped, 0);
    }
}
