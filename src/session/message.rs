//! Wire shapes for the streaming session
//!
//! Inbound messages are a loose tagged union: every field may be absent, and
//! a single message can carry audio, transcript fragments and a turn boundary
//! at once.

use serde::{Deserialize, Serialize};

/// Outbound media frame: base64 PCM16 plus its format tag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFrame {
    pub data: String,
    pub mime_type: String,
}

impl MediaFrame {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Inbound message from the session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<SessionContent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_turn: Option<AudioTurn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription_fragment: Option<TranscriptionFragment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription_fragment: Option<TranscriptionFragment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTurn {
    #[serde(default)]
    pub parts: Vec<AudioPart>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_audio: Option<InlineAudio>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAudio {
    #[serde(default)]
    pub data: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionFragment {
    #[serde(default)]
    pub text: String,
}

impl SessionMessage {
    /// Parse a JSON message
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Base64 audio in the first part of the audio turn, if any
    pub fn audio_payload(&self) -> Option<&str> {
        self.content
            .as_ref()?
            .audio_turn
            .as_ref()?
            .parts
            .first()?
            .inline_audio
            .as_ref()
            .map(|audio| audio.data.as_str())
    }

    /// Fragment of the agent's speech transcript
    pub fn output_fragment(&self) -> Option<&str> {
        self.content
            .as_ref()?
            .output_transcription_fragment
            .as_ref()
            .map(|f| f.text.as_str())
    }

    /// Fragment of the user's speech transcript
    pub fn input_fragment(&self) -> Option<&str> {
        self.content
            .as_ref()?
            .input_transcription_fragment
            .as_ref()
            .map(|f| f.text.as_str())
    }

    /// Whether this message closes the current turn
    pub fn is_turn_complete(&self) -> bool {
        self.content
            .as_ref()
            .and_then(|c| c.turn_complete)
            .unwrap_or(false)
    }

    // === Builders, mostly for simulated sessions ===

    /// Message carrying one audio payload
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            content: Some(SessionContent {
                audio_turn: Some(AudioTurn {
                    parts: vec![AudioPart {
                        inline_audio: Some(InlineAudio {
                            data: data.into(),
                            mime_type: None,
                        }),
                    }],
                }),
                ..Default::default()
            }),
        }
    }

    /// Message carrying an agent transcript fragment
    pub fn output_transcript(text: impl Into<String>) -> Self {
        Self {
            content: Some(SessionContent {
                output_transcription_fragment: Some(TranscriptionFragment { text: text.into() }),
                ..Default::default()
            }),
        }
    }

    /// Message carrying a user transcript fragment
    pub fn input_transcript(text: impl Into<String>) -> Self {
        Self {
            content: Some(SessionContent {
                input_transcription_fragment: Some(TranscriptionFragment { text: text.into() }),
                ..Default::default()
            }),
        }
    }

    /// Turn boundary
    pub fn turn_complete() -> Self {
        Self {
            content: Some(SessionContent {
                turn_complete: Some(true),
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_payload() {
        let msg = SessionMessage::from_json(
            r#"{"content":{"audioTurn":{"parts":[{"inlineAudio":{"data":"AAA=","mimeType":"audio/pcm;rate=24000"}},{"inlineAudio":{"data":"BBB="}}]}}}"#,
        )
        .unwrap();

        assert_eq!(msg.audio_payload(), Some("AAA="));
        assert!(!msg.is_turn_complete());
        assert!(msg.output_fragment().is_none());
    }

    #[test]
    fn test_parse_fragments_and_turn_complete() {
        let msg = SessionMessage::from_json(
            r#"{"content":{"outputTranscriptionFragment":{"text":"Hel"},"inputTranscriptionFragment":{"text":"hi"},"turnComplete":true}}"#,
        )
        .unwrap();

        assert_eq!(msg.output_fragment(), Some("Hel"));
        assert_eq!(msg.input_fragment(), Some("hi"));
        assert!(msg.is_turn_complete());
        assert!(msg.audio_payload().is_none());
    }

    #[test]
    fn test_everything_optional() {
        for json in [r#"{}"#, r#"{"content":{}}"#, r#"{"content":{"audioTurn":{}}}"#] {
            let msg = SessionMessage::from_json(json).unwrap();
            assert!(msg.audio_payload().is_none());
            assert!(!msg.is_turn_complete());
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let msg = SessionMessage::from_json(r#"{"usage":{"tokens":3},"content":{"turnComplete":false}}"#)
            .unwrap();
        assert!(!msg.is_turn_complete());
    }

    #[test]
    fn test_media_frame_serializes_camel_case() {
        let frame = MediaFrame::new("AAA=", "audio/pcm;rate=16000");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"data":"AAA=","mimeType":"audio/pcm;rate=16000"}"#);
    }

    #[test]
    fn test_builders_round_trip_through_json() {
        let msg = SessionMessage::audio("AAA=");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(SessionMessage::from_json(&json).unwrap(), msg);
    }
}
