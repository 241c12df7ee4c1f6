use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// One committed line of the call transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptionEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }

    /// Build an entry, or `None` if the text is blank after trimming
    pub fn non_blank(speaker: Speaker, text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            None
        } else {
            Some(Self::new(speaker, text))
        }
    }
}

impl fmt::Display for TranscriptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_rejected() {
        assert!(TranscriptionEntry::non_blank(Speaker::User, "").is_none());
        assert!(TranscriptionEntry::non_blank(Speaker::User, " \t\n").is_none());
        assert!(TranscriptionEntry::non_blank(Speaker::Agent, "\u{3000}").is_none());
    }

    #[test]
    fn test_text_kept_verbatim() {
        let entry = TranscriptionEntry::non_blank(Speaker::Agent, " Hi there ").unwrap();
        assert_eq!(entry.text, " Hi there ");
    }

    #[test]
    fn test_serializes_lowercase_speaker() {
        let json = serde_json::to_string(&TranscriptionEntry::new(Speaker::Agent, "ok")).unwrap();
        assert_eq!(json, r#"{"speaker":"agent","text":"ok"}"#);
    }
}
