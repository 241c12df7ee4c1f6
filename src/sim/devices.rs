use crate::audio::capture::{FrameSender, FrameSource};
use crate::audio::decoder::DecodedAudio;
use crate::audio::playback::{FrameSink, PlaybackCompletion};
use crate::sim::tone;
use crate::{CallError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Frame source that delivers a quiet tone from a thread
///
/// Blocks are paced at real time unless a different pace is set.
pub struct ToneSource {
    frequency: f32,
    pace: Option<Duration>,
    deny: Option<String>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ToneSource {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            pace: None,
            deny: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Deliver one block every `pace` instead of at real time
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Refuse to start, like a microphone the user has not allowed
    pub fn denied(reason: impl Into<String>) -> Self {
        let mut source = Self::new(0.0);
        source.deny = Some(reason.into());
        source
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl FrameSource for ToneSource {
    fn start(&mut self, sample_rate: u32, block_size: usize, frames: FrameSender) -> Result<()> {
        if let Some(reason) = &self.deny {
            return Err(CallError::Permission(reason.clone()));
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let block_seconds = block_size as f64 / sample_rate as f64;
        let pace = self
            .pace
            .unwrap_or_else(|| Duration::from_secs_f64(block_seconds));
        let samples = tone(block_seconds, sample_rate, self.frequency);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let worker = thread::Builder::new()
            .name("tone-source".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    if !frames.send(samples.clone()) {
                        break;
                    }
                    thread::sleep(pace);
                }
                debug!("Tone source thread exiting");
            })
            .map_err(|e| CallError::Permission(format!("Failed to spawn capture thread: {}", e)))?;

        self.worker = Some(worker);
        info!("Tone source started at {} Hz", sample_rate);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("Tone source stopped");
        }
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Something a [`TimedSink`] was asked to play
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayedChunk {
    pub chunk_id: u64,
    pub start: f64,
    pub duration: f64,
}

#[derive(Default)]
struct SinkLog {
    opened_at: Option<u32>,
    played: Vec<PlayedChunk>,
    closed: bool,
}

/// Frame sink on the wall clock
///
/// Nothing is played; each chunk completes once the clock passes its
/// scheduled end. The clock starts at the first scheduled chunk. `speed`
/// scales the clock so tests can run faster than real time.
#[derive(Clone)]
pub struct TimedSink {
    speed: f64,
    fail_open: bool,
    epoch: Arc<Mutex<Option<Instant>>>,
    cancelled: Arc<AtomicBool>,
    log: Arc<Mutex<SinkLog>>,
}

impl Default for TimedSink {
    fn default() -> Self {
        Self {
            speed: 1.0,
            fail_open: false,
            epoch: Arc::new(Mutex::new(None)),
            cancelled: Arc::new(AtomicBool::new(false)),
            log: Arc::new(Mutex::new(SinkLog::default())),
        }
    }
}

impl TimedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the clock `speed` times faster than real time
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(f64::EPSILON);
        self
    }

    /// Fail to open, like a missing output device
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Chunks scheduled so far (shared across clones)
    pub fn played(&self) -> Vec<PlayedChunk> {
        self.log.lock().played.clone()
    }

    pub fn opened_at(&self) -> Option<u32> {
        self.log.lock().opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }
}

impl FrameSink for TimedSink {
    fn open(&mut self, sample_rate: u32) -> Result<()> {
        if self.fail_open {
            return Err(CallError::PlaybackSinkCreation("No output device".into()));
        }
        self.log.lock().opened_at = Some(sample_rate);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        match *self.epoch.lock() {
            Some(epoch) => epoch.elapsed().as_secs_f64() * self.speed,
            None => 0.0,
        }
    }

    fn schedule(
        &mut self,
        audio: DecodedAudio,
        start_at: f64,
        completion: PlaybackCompletion,
    ) -> Result<()> {
        if self.log.lock().opened_at.is_none() {
            return Err(CallError::PlaybackSchedule("Sink is not open".into()));
        }
        self.epoch.lock().get_or_insert_with(Instant::now);

        let duration = audio.duration();
        let remaining = (start_at + duration - self.current_time()).max(0.0) / self.speed;
        self.log.lock().played.push(PlayedChunk {
            chunk_id: completion.chunk_id(),
            start: start_at,
            duration,
        });

        let cancelled = Arc::clone(&self.cancelled);
        thread::Builder::new()
            .name("timed-sink".into())
            .spawn(move || {
                thread::sleep(Duration::from_secs_f64(remaining));
                if !cancelled.load(Ordering::SeqCst) {
                    completion.complete();
                }
            })
            .map_err(|e| CallError::PlaybackSchedule(format!("Failed to spawn timer: {}", e)))?;

        Ok(())
    }

    fn close(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.log.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallEvent;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_tone_source_denied() {
        let (tx, _rx) = unbounded();
        let mut capture = crate::audio::capture::CaptureLoop::new(
            Box::new(ToneSource::denied("NotAllowedError")),
            16_000,
            256,
            "audio/pcm;rate=16000",
        );
        assert!(matches!(capture.start(tx), Err(CallError::Permission(_))));
        assert!(!capture.is_active());
    }

    #[test]
    fn test_tone_source_delivers_blocks_until_stopped() {
        let (tx, rx) = unbounded();
        let mut capture = crate::audio::capture::CaptureLoop::new(
            Box::new(ToneSource::new(440.0).with_pace(Duration::from_millis(5))),
            16_000,
            128,
            "audio/pcm;rate=16000",
        );
        capture.start(tx).unwrap();

        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(CallEvent::CaptureFrame(samples)) => assert_eq!(samples.len(), 128),
            other => panic!("unexpected event: {:?}", other),
        }

        capture.stop();
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_timed_sink_completes_after_duration() {
        let (tx, rx) = unbounded();
        let mut sink = TimedSink::new().with_speed(10.0);
        sink.open(24_000).unwrap();

        let audio = DecodedAudio {
            sample_rate: 24_000,
            samples: vec![vec![0.0; 2_400]],
        };
        sink.schedule(audio, 0.0, PlaybackCompletion::new(3, tx)).unwrap();

        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(CallEvent::PlaybackComplete { chunk_id }) => assert_eq!(chunk_id, 3),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(sink.played()[0].duration, 0.1);
    }

    #[test]
    fn test_timed_sink_close_cancels_completions() {
        let (tx, rx) = unbounded();
        let mut sink = TimedSink::new().with_speed(10.0);
        sink.open(24_000).unwrap();
        let audio = DecodedAudio {
            sample_rate: 24_000,
            samples: vec![vec![0.0; 2_400]],
        };
        sink.schedule(audio, 0.0, PlaybackCompletion::new(0, tx)).unwrap();
        sink.close();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(sink.is_closed());
    }

    #[test]
    fn test_unavailable_sink_fails_to_open() {
        let mut sink = TimedSink::unavailable();
        assert!(matches!(
            sink.open(24_000),
            Err(CallError::PlaybackSinkCreation(_))
        ));
    }
}
