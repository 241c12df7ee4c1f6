//! Audio pipeline: sample conversion, wire encoding, capture and playback
//!
//! The device adapters (`input`, `output`, `resampler`) are only built with
//! the `audio-io` feature. Everything else is pure and device-free.

pub mod capture;
pub mod codec;
pub mod decoder;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod playback;
#[cfg(feature = "audio-io")]
pub mod resampler;
pub mod transcode;

pub use capture::{CaptureLoop, FrameSender, FrameSource};
pub use codec::{encode_pcm16_le, float_to_pcm16, pcm16_to_float};
pub use decoder::{decode_pcm16, DecodedAudio};
#[cfg(feature = "audio-io")]
pub use input::CpalFrameSource;
#[cfg(feature = "audio-io")]
pub use output::CpalFrameSink;
pub use playback::{AudioChunk, FrameSink, PlaybackCompletion, PlaybackScheduler, ScheduledChunk};
#[cfg(feature = "audio-io")]
pub use resampler::{convert_rate, RateConverter};
