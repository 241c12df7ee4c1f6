//! Configuration for a call

use crate::session::SessionConfig;
use crate::{CallError, Result};

/// Sample rate of captured microphone audio on the wire
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of agent audio received from the session
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured frame
pub const DEFAULT_CAPTURE_BLOCK_SIZE: usize = 4096;

/// Configuration for a single call
#[derive(Clone, Debug)]
pub struct CallConfig {
    /// Instructions the agent follows
    pub system_prompt: String,

    /// Voice used for the greeting and the agent's speech
    pub voice: String,

    /// Opening line, rendered before connecting (empty = no greeting)
    pub greeting: String,

    /// Capture sample rate
    pub input_sample_rate: u32,

    /// Playback sample rate
    pub output_sample_rate: u32,

    /// Samples per captured frame
    pub capture_block_size: usize,

    /// Transcript entries kept before the oldest are evicted
    pub max_transcript_entries: usize,

    /// Capacity of the presentation update channel
    pub update_buffer_size: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a friendly assistant on a phone call. Keep answers short."
                .to_string(),
            voice: "Puck".to_string(),
            greeting: "Hi! Thanks for calling. How can I help you today?".to_string(),
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            capture_block_size: DEFAULT_CAPTURE_BLOCK_SIZE,
            max_transcript_entries: 50,
            update_buffer_size: 100,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Skip the greeting and connect straight away
    pub fn without_greeting(mut self) -> Self {
        self.greeting.clear();
        self
    }

    pub fn with_max_transcript_entries(mut self, max: usize) -> Self {
        self.max_transcript_entries = max;
        self
    }

    pub fn with_capture_block_size(mut self, size: usize) -> Self {
        self.capture_block_size = size;
        self
    }

    pub fn with_update_buffer_size(mut self, size: usize) -> Self {
        self.update_buffer_size = size;
        self
    }

    /// Mime tag attached to outbound media frames
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.input_sample_rate)
    }

    /// Parameters for the session connect
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self.system_prompt.clone(),
            voice: self.voice.clone(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(CallError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }
        if self.capture_block_size == 0 {
            return Err(CallError::Config(
                "Capture block size must be greater than 0".into(),
            ));
        }
        if self.max_transcript_entries == 0 {
            return Err(CallError::Config(
                "Transcript must keep at least one entry".into(),
            ));
        }
        if self.update_buffer_size == 0 {
            return Err(CallError::Config(
                "Update buffer size must be greater than 0".into(),
            ));
        }
        if self.voice.trim().is_empty() {
            return Err(CallError::Config("Voice is required".into()));
        }
        Ok(())
    }
}
