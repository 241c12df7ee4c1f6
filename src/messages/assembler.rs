//! Per-turn transcript assembly
//!
//! The session streams transcript text in fragments for both directions.
//! Fragments are concatenated as-is (they carry their own spacing) and
//! committed as a user/agent pair when the turn ends.

use super::storage::Transcript;
use super::types::{Speaker, TranscriptionEntry};

#[derive(Debug, Clone, Default)]
pub struct TranscriptAssembler {
    user_text: String,
    agent_text: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of what the user said
    pub fn push_user_fragment(&mut self, fragment: &str) {
        self.user_text.push_str(fragment);
    }

    /// Append a fragment of what the agent said
    pub fn push_agent_fragment(&mut self, fragment: &str) {
        self.agent_text.push_str(fragment);
    }

    /// Close the turn
    ///
    /// Appends the user entry then the agent entry, skipping blank ones, and
    /// clears both accumulators. Returns the committed entries.
    pub fn commit_turn(&mut self, transcript: &mut Transcript) -> Vec<TranscriptionEntry> {
        let user = std::mem::take(&mut self.user_text);
        let agent = std::mem::take(&mut self.agent_text);

        let committed: Vec<_> = [
            TranscriptionEntry::non_blank(Speaker::User, &user),
            TranscriptionEntry::non_blank(Speaker::Agent, &agent),
        ]
        .into_iter()
        .flatten()
        .collect();

        for entry in &committed {
            transcript.push(entry.clone());
        }
        committed
    }
}
