//! One-shot greeting synthesis
//!
//! The call's opening line is rendered to audio before the session is
//! connected. The request runs on a worker thread so the dispatch loop never
//! blocks on it; the outcome comes back as [`CallEvent::GreetingReady`].

use crate::call::CallEvent;
use crate::{CallError, Result};
use crossbeam_channel::Sender;
use serde::Deserialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Text-to-speech for the opening line
pub trait GreetingSynthesizer: Send + Sync {
    /// Render `text` with `voice`, returning base64 PCM16 audio at the
    /// playback rate
    ///
    /// Fails with [`CallError::NoAudioData`] when the response has no audio.
    fn synthesize(&self, text: &str, voice: &str) -> Result<String>;
}

/// Speech response body of a one-shot TTS request
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    #[serde(default)]
    pub candidates: Vec<SpeechCandidate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechCandidate {
    #[serde(default)]
    pub content: Option<SpeechContent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechContent {
    #[serde(default)]
    pub parts: Vec<SpeechPart>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPart {
    #[serde(default)]
    pub inline_data: Option<SpeechData>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechData {
    #[serde(default)]
    pub data: String,
}

impl SpeechResponse {
    /// Parse a JSON response body
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CallError::Greeting(e.to_string()))
    }

    /// First inline audio part of the first candidate
    pub fn audio_payload(&self) -> Result<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.inline_data.as_ref())
                    .map(|d| d.data.as_str())
                    .find(|data| !data.is_empty())
            })
            .ok_or(CallError::NoAudioData)
    }
}

/// Run a greeting request off the dispatch thread
pub(crate) fn request_greeting(
    synthesizer: Arc<dyn GreetingSynthesizer>,
    text: String,
    voice: String,
    events: Sender<CallEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Requesting greeting audio ({} chars, voice {})", text.len(), voice);
        let result = synthesizer.synthesize(&text, &voice);
        if let Err(e) = &result {
            error!("Greeting synthesis failed: {}", e);
        }
        if events.send(CallEvent::GreetingReady(result)).is_err() {
            debug!("Greeting finished after the call was gone");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_audio_payload_found() {
        let response = SpeechResponse::from_json(
            r#"{"candidates":[{"content":{"parts":[{"text":"ignored"},{"inlineData":{"mimeType":"audio/pcm","data":"AAA="}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.audio_payload().unwrap(), "AAA=");
    }

    #[test]
    fn test_missing_audio_is_no_audio_data() {
        for json in [
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"data":""}}]}}]}"#,
        ] {
            let response = SpeechResponse::from_json(json).unwrap();
            assert_eq!(response.audio_payload().unwrap_err(), CallError::NoAudioData);
        }
    }

    #[test]
    fn test_malformed_body_is_greeting_error() {
        assert!(matches!(
            SpeechResponse::from_json("<html>"),
            Err(CallError::Greeting(_))
        ));
    }

    struct Fixed(Result<String>);

    impl GreetingSynthesizer for Fixed {
        fn synthesize(&self, _text: &str, _voice: &str) -> Result<String> {
            self.0.clone()
        }
    }

    #[test]
    fn test_request_posts_result() {
        let (tx, rx) = unbounded();
        request_greeting(
            Arc::new(Fixed(Err(CallError::NoAudioData))),
            "Hello".into(),
            "Puck".into(),
            tx,
        )
        .join()
        .unwrap();

        match rx.try_recv() {
            Ok(CallEvent::GreetingReady(Err(CallError::NoAudioData))) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
