//! Sample format conversion between normalized `f32` and 16-bit PCM
//!
//! Encoding and decoding share the same scale (`i16::MAX`), so every value
//! produced by [`float_to_pcm16`] decodes back to exactly the float it came
//! from. The negative extreme is asymmetric on purpose: `-1.0` maps to
//! `-32767`, never to `i16::MIN`.

/// Scale shared by encode and decode
pub const PCM16_SCALE: f32 = i16::MAX as f32;

/// Convert a normalized sample to 16-bit PCM with saturation
///
/// Input outside `[-1.0, 1.0]` is clamped rather than rejected.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a 16-bit PCM sample back to a normalized float
pub fn pcm16_to_float(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

/// Encode a block of normalized samples as little-endian PCM16 bytes
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
    bytes
}
