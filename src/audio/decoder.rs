//! PCM frame decoding
//!
//! Rebuilds a per-channel float buffer from interleaved little-endian PCM16
//! bytes. Any `&[u8]` works as input, so callers can hand in a view into a
//! larger store and only that range is read.

use crate::audio::codec::pcm16_to_float;
use crate::{CallError, Result};

/// Decoded, time-domain audio ready for a frame sink
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// One buffer of normalized samples per channel
    pub samples: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Number of channels
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames (samples per channel)
    pub fn sample_count(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate as f64
    }

    /// Get a single channel's samples
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.samples.get(index).map(Vec::as_slice)
    }

    /// Mix all channels down to one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.samples.len() {
            0 => Vec::new(),
            1 => self.samples[0].clone(),
            n => (0..self.sample_count())
                .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Decode interleaved PCM16 bytes into per-channel float buffers
///
/// Frame count is `bytes.len() / 2 / channels`; a trailing partial frame is
/// ignored. Odd byte lengths are rejected.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<DecodedAudio> {
    if bytes.len() % 2 != 0 {
        return Err(CallError::MisalignedData { len: bytes.len() });
    }
    if channels == 0 {
        return Err(CallError::Config("Channel count must be greater than 0".into()));
    }
    if sample_rate == 0 {
        return Err(CallError::Config("Sample rate must be greater than 0".into()));
    }

    let channels = channels as usize;
    let frame_count = bytes.len() / 2 / channels;
    let mut samples = vec![Vec::with_capacity(frame_count); channels];

    for frame in bytes.chunks_exact(2 * channels).take(frame_count) {
        for (channel, pair) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            samples[channel].push(pcm16_to_float(value));
        }
    }

    Ok(DecodedAudio {
        sample_rate,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::encode_pcm16_le;

    #[test]
    fn test_mono_frame_count_and_rate() {
        let bytes = encode_pcm16_le(&[0.0, 0.5, -0.5]);
        let audio = decode_pcm16(&bytes, 24_000, 1).unwrap();

        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.sample_count(), 3);
        assert_eq!(audio.sample_rate, 24_000);
    }

    #[test]
    fn test_stereo_deinterleaves() {
        let bytes = encode_pcm16_le(&[1.0, -1.0, 0.0, 0.0, -1.0, 1.0]);
        let audio = decode_pcm16(&bytes, 16_000, 2).unwrap();

        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_count(), 3);
        assert_eq!(audio.channel(0).unwrap(), &[1.0, 0.0, -1.0]);
        assert_eq!(audio.channel(1).unwrap(), &[-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_odd_length_is_misaligned() {
        let err = decode_pcm16(&[0, 0, 0], 24_000, 1).unwrap_err();
        assert_eq!(err, CallError::MisalignedData { len: 3 });
    }

    #[test]
    fn test_reads_only_the_given_view() {
        let mut store = vec![0xEE; 4];
        store.extend(encode_pcm16_le(&[1.0, -1.0]));
        store.extend([0xEE; 6]);

        let audio = decode_pcm16(&store[4..8], 24_000, 1).unwrap();
        assert_eq!(audio.channel(0).unwrap(), &[1.0, -1.0]);
    }

    #[test]
    fn test_duration() {
        let bytes = vec![0u8; 24_000];
        let audio = decode_pcm16(&bytes, 24_000, 1).unwrap();
        assert!((audio.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_payload_decodes_to_silence() {
        let audio = decode_pcm16(&[], 24_000, 1).unwrap();
        assert_eq!(audio.sample_count(), 0);
        assert_eq!(audio.duration(), 0.0);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(matches!(
            decode_pcm16(&[0, 0], 24_000, 0),
            Err(CallError::Config(_))
        ));
    }

    #[test]
    fn test_to_mono_averages() {
        let audio = DecodedAudio {
            sample_rate: 8_000,
            samples: vec![vec![1.0, 0.0], vec![0.0, 0.5]],
        };
        assert_eq!(audio.to_mono(), vec![0.5, 0.25]);
    }
}
