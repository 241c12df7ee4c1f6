pub mod audio;
pub mod call;
pub mod greeting;
pub mod messages;
pub mod session;
pub mod sim;

pub use call::{
    CallCollaborators, CallConfig, CallEvent, CallHandle, CallSession, CallStatus, CallUpdate,
    SharedCallState,
};
pub use messages::{Speaker, TranscriptionEntry};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("Microphone unavailable: {0}")]
    Permission(String),

    #[error("Microphone stopped: {0}")]
    CaptureLost(String),

    #[error("Audio payload decode error: {0}")]
    Decode(String),

    #[error("PCM data is misaligned: {len} bytes is not a whole number of 16-bit samples")]
    MisalignedData { len: usize },

    #[error("Failed to create playback sink: {0}")]
    PlaybackSinkCreation(String),

    #[error("Failed to schedule playback: {0}")]
    PlaybackSchedule(String),

    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    #[error("Greeting response contained no audio data")]
    NoAudioData,

    #[error("Greeting request failed: {0}")]
    Greeting(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CallError {
    /// Check if this error is recoverable
    ///
    /// A recoverable error affects a single chunk or the greeting; the call
    /// carries on. Anything else ends the useful life of the call.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Device access needs the user to intervene
            CallError::Permission(_) => false,
            CallError::CaptureLost(_) => false,
            // A bad chunk is skipped, the queue keeps draining
            CallError::Decode(_) => true,
            CallError::MisalignedData { .. } => true,
            CallError::PlaybackSinkCreation(_) => false,
            CallError::PlaybackSchedule(_) => true,
            CallError::AudioProcessing(_) => true,
            // Greeting failures fall back to connecting straight away
            CallError::NoAudioData => true,
            CallError::Greeting(_) => true,
            CallError::Session(_) => false,
            CallError::Connection(_) => false,
            CallError::Channel(_) => false,
            CallError::Config(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            CallError::Permission(_) => {
                "Microphone access was denied. Please allow microphone access and start a new call."
                    .to_string()
            }
            CallError::CaptureLost(_) => {
                "The microphone stopped working. Please check it and start a new call.".to_string()
            }
            CallError::Decode(_) | CallError::MisalignedData { .. } => {
                "Some of the agent's audio could not be played.".to_string()
            }
            CallError::PlaybackSinkCreation(_) => {
                "Audio output is unavailable. Please check your speakers.".to_string()
            }
            CallError::PlaybackSchedule(_) | CallError::AudioProcessing(_) => {
                "Audio playback failed for part of the response.".to_string()
            }
            CallError::NoAudioData | CallError::Greeting(_) => {
                "The greeting could not be played.".to_string()
            }
            CallError::Session(_) => "The call ran into a problem with the agent.".to_string(),
            CallError::Connection(_) => "Could not connect to the agent.".to_string(),
            CallError::Channel(_) => {
                "Internal communication error. Please start a new call.".to_string()
            }
            CallError::Config(_) => "Configuration error. Please check settings.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_errors_are_recoverable() {
        assert!(CallError::Decode("bad".into()).is_recoverable());
        assert!(CallError::MisalignedData { len: 3 }.is_recoverable());
        assert!(CallError::NoAudioData.is_recoverable());
    }

    #[test]
    fn test_device_and_session_errors_are_terminal() {
        assert!(!CallError::Permission("denied".into()).is_recoverable());
        assert!(!CallError::PlaybackSinkCreation("none".into()).is_recoverable());
        assert!(!CallError::Session("boom".into()).is_recoverable());
    }

    #[test]
    fn test_permission_message_is_plain_language() {
        let msg = CallError::Permission("NotAllowedError".into()).user_message();
        assert!(msg.contains("Microphone"));
        assert!(!msg.contains("NotAllowedError"));
    }

    #[test]
    fn test_lost_microphone_is_not_reported_as_denied() {
        let error = CallError::CaptureLost("device unplugged".into());
        assert!(!error.is_recoverable());
        let msg = error.user_message();
        assert!(msg.contains("microphone"));
        assert!(!msg.contains("denied"));
    }
}
