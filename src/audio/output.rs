use crate::audio::decoder::DecodedAudio;
use crate::audio::playback::{FrameSink, PlaybackCompletion};
use crate::audio::resampler::convert_rate;
use crate::{CallError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Longest stretch of audio (padding included) the sink buffers at once
const MAX_BUFFERED_SECONDS: u32 = 20;

/// Counters shared with the output callback
#[derive(Default)]
struct Playhead {
    /// Frames written to the device, silence included
    played: AtomicU64,
    /// Frames taken out of the ring
    consumed: AtomicU64,
    /// Completions keyed by the consumed-frame count that ends their chunk
    completions: Mutex<VecDeque<(u64, PlaybackCompletion)>>,
}

/// Output callback state
struct Playout {
    consumer: HeapCons<f32>,
    playhead: Arc<Playhead>,
    channels: usize,
}

impl Playout {
    /// Fill one device buffer and fire completions for finished chunks
    fn render(&mut self, data: &mut [f32]) {
        let mut frames = 0u64;
        let mut consumed = 0u64;

        for frame in data.chunks_mut(self.channels) {
            let sample = match self.consumer.try_pop() {
                Some(sample) => {
                    consumed += 1;
                    sample
                }
                None => 0.0,
            };
            frame.fill(sample);
            frames += 1;
        }

        self.playhead.played.fetch_add(frames, Ordering::SeqCst);
        let consumed = self.playhead.consumed.fetch_add(consumed, Ordering::SeqCst) + consumed;

        let mut completions = self.playhead.completions.lock();
        while completions.front().map_or(false, |(end, _)| *end <= consumed) {
            if let Some((_, completion)) = completions.pop_front() {
                completion.complete();
            }
        }
    }
}

/// Speaker frame sink over the default cpal output device
///
/// Chunks are resampled to the device rate and pushed into a ring the
/// output callback drains. The sink clock counts every frame the device has
/// played, silence included, so gaps before a scheduled start are filled
/// with silence.
pub struct CpalFrameSink {
    device: Device,
    stream: Option<Stream>,
    producer: Option<HeapProd<f32>>,
    playhead: Arc<Playhead>,
    device_rate: u32,
    pushed: u64,
}

impl CpalFrameSink {
    /// Use the default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| CallError::PlaybackSinkCreation("No output device available".into()))?;

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        Ok(Self {
            device,
            stream: None,
            producer: None,
            playhead: Arc::new(Playhead::default()),
            device_rate: 0,
            pushed: 0,
        })
    }

    /// Whether the device stream is running
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_config(&self, sample_rate: u32) -> Result<StreamConfig> {
        let supported = self.device.supported_output_configs().map_err(|e| {
            CallError::PlaybackSinkCreation(format!("Failed to query output configs: {}", e))
        })?;

        for range in supported {
            if range.sample_format() == SampleFormat::F32
                && range.min_sample_rate().0 <= sample_rate
                && sample_rate <= range.max_sample_rate().0
            {
                return Ok(range.with_sample_rate(SampleRate(sample_rate)).into());
            }
        }

        let config = self.device.default_output_config().map_err(|e| {
            CallError::PlaybackSinkCreation(format!("Failed to get output config: {}", e))
        })?;
        debug!(
            "Output device has no {} Hz config, using {} Hz",
            sample_rate,
            config.sample_rate().0
        );
        Ok(config.into())
    }

    /// Frame on the sink clock at which the next pushed sample will play
    fn write_cursor(&self) -> u64 {
        let played = self.playhead.played.load(Ordering::SeqCst);
        let consumed = self.playhead.consumed.load(Ordering::SeqCst);
        played + self.pushed.saturating_sub(consumed)
    }
}

impl FrameSink for CpalFrameSink {
    fn open(&mut self, sample_rate: u32) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let config = self.stream_config(sample_rate)?;
        let channels = config.channels as usize;
        let device_rate = config.sample_rate.0;

        let ring = HeapRb::<f32>::new((device_rate * MAX_BUFFERED_SECONDS) as usize);
        let (producer, consumer) = ring.split();

        self.playhead = Arc::new(Playhead::default());
        self.pushed = 0;

        let mut playout = Playout {
            consumer,
            playhead: Arc::clone(&self.playhead),
            channels: channels.max(1),
        };

        let err_fn = |err| {
            error!("Audio output stream error: {}", err);
        };

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| playout.render(data),
                err_fn,
                None,
            )
            .map_err(|e| {
                CallError::PlaybackSinkCreation(format!("Failed to build output stream: {}", e))
            })?;

        stream.play().map_err(|e| {
            CallError::PlaybackSinkCreation(format!("Failed to start output stream: {}", e))
        })?;

        info!(
            "Output stream started: device {} Hz x{}, source {} Hz",
            device_rate, channels, sample_rate
        );
        self.device_rate = device_rate;
        self.producer = Some(producer);
        self.stream = Some(stream);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        if self.device_rate == 0 {
            return 0.0;
        }
        self.playhead.played.load(Ordering::SeqCst) as f64 / self.device_rate as f64
    }

    fn schedule(
        &mut self,
        audio: DecodedAudio,
        start_at: f64,
        completion: PlaybackCompletion,
    ) -> Result<()> {
        let device_rate = self.device_rate;
        let cursor = self.write_cursor();
        let producer = self
            .producer
            .as_mut()
            .ok_or_else(|| CallError::PlaybackSchedule("Output stream is not open".into()))?;

        let samples = convert_rate(&audio.to_mono(), audio.sample_rate, device_rate)
            .map_err(|e| CallError::PlaybackSchedule(e.to_string()))?;

        let start_frame = (start_at.max(0.0) * device_rate as f64).round() as u64;
        let padding = start_frame.saturating_sub(cursor) as usize;

        if padding + samples.len() > producer.vacant_len() {
            return Err(CallError::PlaybackSchedule(format!(
                "{} frames do not fit in the playback buffer",
                padding + samples.len()
            )));
        }

        let silence = vec![0.0f32; padding];
        let written = producer.push_slice(&silence) + producer.push_slice(&samples);
        self.pushed += written as u64;

        debug!(
            "Chunk {} queued: {} frames after {} frames of silence",
            completion.chunk_id(),
            samples.len(),
            padding
        );
        self.playhead
            .completions
            .lock()
            .push_back((self.pushed, completion));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Output stream stopped");
        }
        self.producer = None;
        self.playhead.completions.lock().clear();
    }
}

impl Drop for CpalFrameSink {
    fn drop(&mut self) {
        self.close();
    }
}
