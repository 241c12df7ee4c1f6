use crate::{CallError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Frames per resampler call
const CHUNK_SIZE: usize = 1024;

/// Streaming mono sample rate converter
///
/// Input is accumulated until a whole resampler chunk is available, so
/// arbitrary callback sizes can be pushed without zero-padding between them.
pub struct RateConverter {
    resampler: SincFixedIn<f32>,
    from_rate: u32,
    to_rate: u32,
    pending: Vec<f32>,
}

impl RateConverter {
    /// Create a converter from `from_rate` to `to_rate`
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(CallError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            2.0,
            params,
            CHUNK_SIZE,
            1,
        )
        .map_err(|e| CallError::Config(format!("Failed to create resampler: {}", e)))?;

        debug!("Created resampler: {} Hz -> {} Hz", from_rate, to_rate);

        Ok(Self {
            resampler,
            from_rate,
            to_rate,
            pending: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn ratio(&self) -> f64 {
        self.to_rate as f64 / self.from_rate as f64
    }

    /// Frames of latency the sinc filter adds at the start of the output
    pub fn delay(&self) -> usize {
        self.resampler.output_delay()
    }

    /// Push samples, returning whatever output whole chunks produced
    pub fn push(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            output.extend(self.process(chunk)?);
        }
        Ok(output)
    }

    /// Zero-pad and convert whatever is still pending
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(CHUNK_SIZE, 0.0);
        self.process(chunk)
    }

    /// Drop pending input and filter state
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }

    fn process(&mut self, chunk: Vec<f32>) -> Result<Vec<f32>> {
        let input = vec![chunk];
        let mut planar = self
            .resampler
            .process(&input, None)
            .map_err(|e| CallError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        Ok(planar.pop().unwrap_or_default())
    }
}

/// Convert a whole mono buffer in one go
///
/// The filter delay is trimmed and the result is cut to the length the rate
/// ratio implies, so durations are preserved.
pub fn convert_rate(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut converter = RateConverter::new(from_rate, to_rate)?;
    let expected = (input.len() as f64 * converter.ratio()).round() as usize;
    let delay = converter.delay();

    let mut output = converter.push(input)?;
    output.extend(converter.flush()?);

    let silence = vec![0.0f32; CHUNK_SIZE];
    while output.len() < delay + expected {
        output.extend(converter.push(&silence)?);
    }

    Ok(output[delay..delay + expected].to_vec())
}
