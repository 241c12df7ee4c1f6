//! Gapless playback scheduling
//!
//! Agent audio arrives as base64 chunks at irregular intervals. The scheduler
//! keeps them in a FIFO queue and hands them to the frame sink one at a time,
//! each starting exactly where the previous one ends:
//!
//! ```text
//! start = max(next_start_offset, sink.current_time())
//! next_start_offset = start + duration
//! ```
//!
//! Only one chunk is in flight. The next one is scheduled when the sink
//! reports completion of the current one, which arrives on the call's event
//! channel as [`CallEvent::PlaybackComplete`].

use crate::audio::decoder::{decode_pcm16, DecodedAudio};
use crate::audio::transcode;
use crate::call::CallEvent;
use crate::{CallError, Result};
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// One discrete unit of agent audio waiting for playback
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioChunk {
    /// Base64-encoded little-endian PCM16, mono
    pub payload: String,

    /// Whether this chunk is the call's opening line
    pub is_greeting: bool,
}

impl AudioChunk {
    /// Chunk of regular agent speech
    pub fn speech(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_greeting: false,
        }
    }

    /// Chunk carrying the pre-rendered greeting
    pub fn greeting(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_greeting: true,
        }
    }
}

/// Device-level playback capability
///
/// Implementations own the output device. Times are in seconds on the sink's
/// own monotonic clock, which starts at 0 when the sink is opened.
pub trait FrameSink {
    /// Open the sink at the given output sample rate
    fn open(&mut self, sample_rate: u32) -> Result<()>;

    /// Current position of the sink's playback clock
    fn current_time(&self) -> f64;

    /// Schedule a buffer to start at `start_at`
    ///
    /// The sink must call [`PlaybackCompletion::complete`] once the buffer has
    /// finished playing.
    fn schedule(
        &mut self,
        audio: DecodedAudio,
        start_at: f64,
        completion: PlaybackCompletion,
    ) -> Result<()>;

    /// Stop playback and release the device
    fn close(&mut self);
}

/// Single-use continuation a sink invokes when a chunk finishes
#[derive(Debug)]
pub struct PlaybackCompletion {
    chunk_id: u64,
    events: Sender<CallEvent>,
}

impl PlaybackCompletion {
    pub(crate) fn new(chunk_id: u64, events: Sender<CallEvent>) -> Self {
        Self { chunk_id, events }
    }

    /// Id of the chunk this completion belongs to
    pub fn chunk_id(&self) -> u64 {
        self.chunk_id
    }

    /// Report that the chunk has finished playing
    pub fn complete(self) {
        if self
            .events
            .send(CallEvent::PlaybackComplete {
                chunk_id: self.chunk_id,
            })
            .is_err()
        {
            debug!(
                "Playback completion for chunk {} dropped: call is gone",
                self.chunk_id
            );
        }
    }
}

/// A chunk that has been handed to the sink
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledChunk {
    pub id: u64,
    pub is_greeting: bool,
    /// Scheduled start on the sink clock, seconds
    pub start: f64,
    /// Duration, seconds
    pub duration: f64,
}

/// Outcome of a single [`PlaybackScheduler::pump`]
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Failures hit while trying to start a chunk, in order
    pub failures: Vec<CallError>,

    /// Whether the greeting chunk was dropped instead of played
    pub greeting_dropped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SinkState {
    Unopened,
    Open,
    Failed,
    Closed,
}

/// FIFO playback queue with a single monotonic start cursor
pub struct PlaybackScheduler {
    sink: Box<dyn FrameSink>,
    sink_state: SinkState,
    sample_rate: u32,
    queue: VecDeque<(u64, AudioChunk)>,
    playing: Option<ScheduledChunk>,
    next_start_offset: f64,
    next_chunk_id: u64,
    events: Sender<CallEvent>,
}

impl PlaybackScheduler {
    /// Create a scheduler around an unopened sink
    ///
    /// The sink is opened lazily on the first [`pump`](Self::pump).
    pub fn new(sink: Box<dyn FrameSink>, sample_rate: u32, events: Sender<CallEvent>) -> Self {
        Self {
            sink,
            sink_state: SinkState::Unopened,
            sample_rate,
            queue: VecDeque::new(),
            playing: None,
            next_start_offset: 0.0,
            next_chunk_id: 0,
            events,
        }
    }

    /// Add a chunk to the back of the queue
    ///
    /// Returns false if the sink is unusable and the chunk was discarded.
    pub fn enqueue(&mut self, chunk: AudioChunk) -> bool {
        if matches!(self.sink_state, SinkState::Failed | SinkState::Closed) {
            debug!("Discarding chunk: playback is not available");
            return false;
        }

        let id = self.next_chunk_id;
        self.next_chunk_id += 1;
        self.queue.push_back((id, chunk));
        true
    }

    /// Start the next chunk if nothing is playing
    ///
    /// A chunk that fails to decode or schedule is reported and skipped; the
    /// scheduler moves on to the one behind it so a bad payload never stalls
    /// the queue.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();

        if self.playing.is_some() || self.queue.is_empty() {
            return report;
        }

        if let Err(e) = self.ensure_sink() {
            report.greeting_dropped = self.queue.iter().any(|(_, c)| c.is_greeting);
            self.queue.clear();
            report.failures.push(e);
            return report;
        }

        while let Some((id, chunk)) = self.queue.pop_front() {
            let audio = match self.decode_chunk(&chunk) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Dropping chunk {}: {}", id, e);
                    report.greeting_dropped |= chunk.is_greeting;
                    report.failures.push(e);
                    continue;
                }
            };

            let duration = audio.duration();
            let start = self.next_start_offset.max(self.sink.current_time());
            let completion = PlaybackCompletion::new(id, self.events.clone());

            if let Err(e) = self.sink.schedule(audio, start, completion) {
                warn!("Failed to schedule chunk {}: {}", id, e);
                report.greeting_dropped |= chunk.is_greeting;
                report.failures.push(e);
                continue;
            }

            self.next_start_offset = start + duration;
            let scheduled = ScheduledChunk {
                id,
                is_greeting: chunk.is_greeting,
                start,
                duration,
            };
            debug!(
                "Scheduled chunk {} at {:.3}s for {:.3}s (greeting: {})",
                id, start, duration, chunk.is_greeting
            );

            self.playing = Some(scheduled);
            break;
        }

        report
    }

    /// Handle a completion reported by the sink
    ///
    /// Returns the finished chunk, or `None` for a stale or unknown id. The
    /// caller is expected to [`pump`](Self::pump) afterwards.
    pub fn on_complete(&mut self, chunk_id: u64) -> Option<ScheduledChunk> {
        match self.playing {
            Some(chunk) if chunk.id == chunk_id => {
                self.playing = None;
                Some(chunk)
            }
            _ => {
                debug!("Ignoring completion for chunk {}", chunk_id);
                None
            }
        }
    }

    /// Whether a chunk is currently in flight
    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    /// Number of chunks waiting behind the current one
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Where the next chunk will start, at the earliest
    pub fn next_start_offset(&self) -> f64 {
        self.next_start_offset
    }

    /// Whether the sink failed to open
    pub fn has_failed(&self) -> bool {
        self.sink_state == SinkState::Failed
    }

    /// Drop all queued audio and release the sink
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.playing = None;
        if self.sink_state == SinkState::Open {
            self.sink.close();
            info!("Playback sink released");
        }
        if self.sink_state != SinkState::Failed {
            self.sink_state = SinkState::Closed;
        }
    }

    fn ensure_sink(&mut self) -> Result<()> {
        match self.sink_state {
            SinkState::Open => Ok(()),
            SinkState::Unopened => match self.sink.open(self.sample_rate) {
                Ok(()) => {
                    info!("Playback sink opened at {} Hz", self.sample_rate);
                    self.sink_state = SinkState::Open;
                    Ok(())
                }
                Err(e) => {
                    self.sink_state = SinkState::Failed;
                    Err(match e {
                        CallError::PlaybackSinkCreation(_) => e,
                        other => CallError::PlaybackSinkCreation(other.to_string()),
                    })
                }
            },
            SinkState::Failed | SinkState::Closed => Err(CallError::PlaybackSinkCreation(
                "Playback sink is not available".into(),
            )),
        }
    }

    fn decode_chunk(&self, chunk: &AudioChunk) -> Result<DecodedAudio> {
        let bytes = transcode::decode(&chunk.payload)?;
        decode_pcm16(&bytes, self.sample_rate, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::encode_pcm16_le;
    use crossbeam_channel::{unbounded, Receiver};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        scheduled: Vec<(f64, usize)>,
        completions: Vec<PlaybackCompletion>,
        closed: bool,
    }

    struct FakeSink {
        now: Arc<Mutex<f64>>,
        recorded: Arc<Mutex<Recorded>>,
        fail_open: bool,
    }

    impl FrameSink for FakeSink {
        fn open(&mut self, _sample_rate: u32) -> Result<()> {
            if self.fail_open {
                Err(CallError::PlaybackSinkCreation("no device".into()))
            } else {
                Ok(())
            }
        }

        fn current_time(&self) -> f64 {
            *self.now.lock()
        }

        fn schedule(
            &mut self,
            audio: DecodedAudio,
            start_at: f64,
            completion: PlaybackCompletion,
        ) -> Result<()> {
            let mut recorded = self.recorded.lock();
            recorded.scheduled.push((start_at, audio.sample_count()));
            recorded.completions.push(completion);
            Ok(())
        }

        fn close(&mut self) {
            self.recorded.lock().closed = true;
        }
    }

    fn scheduler(
        fail_open: bool,
    ) -> (
        PlaybackScheduler,
        Arc<Mutex<f64>>,
        Arc<Mutex<Recorded>>,
        Receiver<CallEvent>,
    ) {
        let now = Arc::new(Mutex::new(0.0));
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let sink = FakeSink {
            now: Arc::clone(&now),
            recorded: Arc::clone(&recorded),
            fail_open,
        };
        let (tx, rx) = unbounded();
        (PlaybackScheduler::new(Box::new(sink), 1_000, tx), now, recorded, rx)
    }

    fn chunk_of(samples: usize) -> String {
        transcode::encode(&encode_pcm16_le(&vec![0.25; samples]))
    }

    fn finish_current(
        scheduler: &mut PlaybackScheduler,
        rx: &Receiver<CallEvent>,
        recorded: &Arc<Mutex<Recorded>>,
    ) -> ScheduledChunk {
        let completion = recorded.lock().completions.remove(0);
        completion.complete();
        match rx.try_recv() {
            Ok(CallEvent::PlaybackComplete { chunk_id }) => scheduler.on_complete(chunk_id).unwrap(),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    fn start_of(recorded: &Arc<Mutex<Recorded>>, index: usize) -> f64 {
        recorded.lock().scheduled[index].0
    }

    #[test]
    fn test_pump_on_empty_queue_is_noop() {
        let (mut scheduler, _, recorded, _rx) = scheduler(false);
        let report = scheduler.pump();
        assert!(!scheduler.is_playing());
        assert!(report.failures.is_empty());
        assert!(recorded.lock().scheduled.is_empty());
    }

    #[test]
    fn test_greeting_then_speech_scheduled_back_to_back() {
        let (mut scheduler, _, recorded, rx) = scheduler(false);

        scheduler.enqueue(AudioChunk::greeting(chunk_of(500)));
        scheduler.pump();
        assert_eq!(start_of(&recorded, 0), 0.0);
        assert!((scheduler.next_start_offset() - 0.5).abs() < 1e-9);

        // Arrives while the greeting plays: waits its turn
        scheduler.enqueue(AudioChunk::speech(chunk_of(250)));
        scheduler.pump();
        assert_eq!(recorded.lock().scheduled.len(), 1);
        assert_eq!(scheduler.queued(), 1);

        assert!(finish_current(&mut scheduler, &rx, &recorded).is_greeting);
        scheduler.pump();
        assert!((start_of(&recorded, 1) - 0.5).abs() < 1e-9);
        assert!(!finish_current(&mut scheduler, &rx, &recorded).is_greeting);
    }

    #[test]
    fn test_fifo_order_never_overlaps() {
        let (mut scheduler, now, recorded, rx) = scheduler(false);
        for samples in [100, 300, 200] {
            scheduler.enqueue(AudioChunk::speech(chunk_of(samples)));
        }

        let mut starts = Vec::new();
        scheduler.pump();
        while scheduler.is_playing() {
            // Sink clock lags behind the cursor
            *now.lock() = scheduler.next_start_offset() - 0.05;
            starts.push(finish_current(&mut scheduler, &rx, &recorded));
            scheduler.pump();
        }

        assert_eq!(starts.len(), 3);
        assert_eq!(
            recorded.lock().scheduled.iter().map(|s| s.1).collect::<Vec<_>>(),
            vec![100, 300, 200]
        );
        for pair in starts.windows(2) {
            assert!(pair[1].start >= pair[0].start);
            assert!(pair[1].start >= pair[0].start + pair[0].duration - 1e-9);
        }
    }

    #[test]
    fn test_start_never_in_the_past() {
        let (mut scheduler, now, recorded, rx) = scheduler(false);
        scheduler.enqueue(AudioChunk::speech(chunk_of(100)));
        scheduler.pump();
        finish_current(&mut scheduler, &rx, &recorded);

        // Silence after the first chunk: clock has moved well past the cursor
        *now.lock() = 3.0;
        scheduler.enqueue(AudioChunk::speech(chunk_of(100)));
        scheduler.pump();
        assert_eq!(start_of(&recorded, 1), 3.0);
        assert!((scheduler.next_start_offset() - 3.1).abs() < 1e-9);
    }

    #[test]
    fn test_bad_chunk_is_skipped() {
        let (mut scheduler, _, recorded, _rx) = scheduler(false);
        scheduler.enqueue(AudioChunk::speech("%%%"));
        scheduler.enqueue(AudioChunk::speech(transcode::encode(&[1, 2, 3])));
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));

        let report = scheduler.pump();
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[0], CallError::Decode(_)));
        assert_eq!(report.failures[1], CallError::MisalignedData { len: 3 });
        assert!(scheduler.is_playing());
        assert_eq!(recorded.lock().scheduled.len(), 1);
    }

    #[test]
    fn test_undecodable_greeting_reported() {
        let (mut scheduler, _, _, _rx) = scheduler(false);
        scheduler.enqueue(AudioChunk::greeting("***"));
        let report = scheduler.pump();
        assert!(report.greeting_dropped);
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_sink_open_failure_is_fatal() {
        let (mut scheduler, _, recorded, _rx) = scheduler(true);
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));

        let report = scheduler.pump();
        assert!(matches!(
            report.failures.as_slice(),
            [CallError::PlaybackSinkCreation(_)]
        ));
        assert!(!report.greeting_dropped);
        assert!(scheduler.has_failed());
        assert_eq!(scheduler.queued(), 0);

        // No retry
        assert!(!scheduler.enqueue(AudioChunk::speech(chunk_of(10))));
        assert!(scheduler.pump().failures.is_empty());
        assert!(recorded.lock().scheduled.is_empty());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (mut scheduler, _, _, _rx) = scheduler(false);
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));
        scheduler.pump();

        assert!(scheduler.on_complete(7).is_none());
        assert!(scheduler.is_playing());
        assert_eq!(scheduler.on_complete(0).map(|chunk| chunk.id), Some(0));
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_shutdown_releases_sink() {
        let (mut scheduler, _, recorded, _rx) = scheduler(false);
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));
        scheduler.enqueue(AudioChunk::speech(chunk_of(10)));
        scheduler.pump();

        scheduler.shutdown();
        assert!(recorded.lock().closed);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.queued(), 0);
        assert!(!scheduler.enqueue(AudioChunk::speech(chunk_of(10))));
    }

    #[test]
    fn test_shutdown_without_open_sink_does_not_close() {
        let (mut scheduler, _, recorded, _rx) = scheduler(false);
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!recorded.lock().closed);
    }
}
