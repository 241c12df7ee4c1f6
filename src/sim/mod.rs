//! Simulated collaborators
//!
//! Stand-ins for the remote session, the TTS service and the audio devices.
//! They run on plain threads and report through the same channels the real
//! ones would, so a whole call can be driven without network or hardware.

pub mod devices;
pub mod greeting;
pub mod session;

pub use devices::{PlayedChunk, TimedSink, ToneSource};
pub use greeting::StaticGreeting;
pub use session::{ScriptStep, ScriptedConnector, SessionTap};

use crate::audio::codec::encode_pcm16_le;
use crate::audio::transcode;

/// Sine tone samples at `sample_rate`
pub fn tone(seconds: f64, sample_rate: u32, frequency: f32) -> Vec<f32> {
    let len = (seconds * sample_rate as f64).round() as usize;
    (0..len)
        .map(|i| {
            (i as f32 * frequency * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * 0.3
        })
        .collect()
}

/// Sine tone as a base64 PCM16 payload, the shape agent audio arrives in
pub fn tone_payload(seconds: f64, sample_rate: u32, frequency: f32) -> String {
    transcode::encode(&encode_pcm16_le(&tone(seconds, sample_rate, frequency)))
}
