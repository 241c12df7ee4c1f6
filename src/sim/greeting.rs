use crate::greeting::GreetingSynthesizer;
use crate::sim::tone_payload;
use crate::{CallError, Result};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Greeting synthesizer with a canned answer
pub struct StaticGreeting {
    result: Result<String>,
    latency: Duration,
}

impl StaticGreeting {
    /// Answer with a fixed payload
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            result: Ok(payload.into()),
            latency: Duration::ZERO,
        }
    }

    /// Answer with a tone of the given length
    pub fn tone(seconds: f64, sample_rate: u32) -> Self {
        Self::new(tone_payload(seconds, sample_rate, 523.25))
    }

    /// Always fail
    pub fn failing(error: CallError) -> Self {
        Self {
            result: Err(error),
            latency: Duration::ZERO,
        }
    }

    /// Wait this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl GreetingSynthesizer for StaticGreeting {
    fn synthesize(&self, text: &str, voice: &str) -> Result<String> {
        debug!("Simulated greeting for {:?} in voice {}", text, voice);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.result.clone()
    }
}
