use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    User,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Agent => f.write_str("Agent"),
            Speaker::User => f.write_str("User"),
        }
    }
}

/// One completed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    /// Position in the conversation (0-based)
    pub order: usize,
}

/// Which transcript ended up in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Remote,
    Live,
}

/// Ordered, append-only log of utterances
#[derive(Debug, Clone, Default)]
pub struct TranscriptAssembler {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an utterance; blank text is ignored
    pub fn append(&mut self, speaker: Speaker, text: impl AsRef<str>) -> Option<&TranscriptEntry> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return None;
        }

        let order = self.entries.len();
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.to_string(),
            order,
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `"<Speaker>: <text>"` lines in conversation order
    pub fn render(&self) -> String {
        render_entries(&self.entries)
    }

    /// Prefer an authoritative transcript from the agent service when it has content
    pub fn resolve(
        &self,
        authoritative: Option<Vec<TranscriptEntry>>,
    ) -> (Vec<TranscriptEntry>, TranscriptSource) {
        match authoritative {
            Some(entries) if entries.iter().any(|e| !e.text.trim().is_empty()) => {
                (entries, TranscriptSource::Remote)
            }
            _ => (self.entries.clone(), TranscriptSource::Live),
        }
    }
}

pub fn render_entries(entries: &[TranscriptEntry]) -> String {
    let mut ordered: Vec<&TranscriptEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.order);

    ordered
        .iter()
        .filter(|e| !e.text.trim().is_empty())
        .map(|e| format!("{}: {}", e.speaker, e.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_in_order() {
        let mut transcript = TranscriptAssembler::new();
        transcript.append(Speaker::Agent, "Why do you want this role?");
        transcript.append(Speaker::User, "  I enjoy systems work. ");
        transcript.append(Speaker::Agent, "Thanks.");

        assert_eq!(
            transcript.render(),
            "Agent: Why do you want this role?\nUser: I enjoy systems work.\nAgent: Thanks."
        );
        assert_eq!(transcript.entries()[2].order, 2);
    }

    #[test]
    fn test_blank_text_not_appended() {
        let mut transcript = TranscriptAssembler::new();
        assert!(transcript.append(Speaker::User, "   ").is_none());
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_authoritative_transcript_preferred() {
        let mut transcript = TranscriptAssembler::new();
        transcript.append(Speaker::Agent, "live question");

        let remote = vec![
            TranscriptEntry { speaker: Speaker::Agent, text: "remote question".into(), order: 0 },
            TranscriptEntry { speaker: Speaker::User, text: "remote answer".into(), order: 1 },
        ];
        let (entries, source) = transcript.resolve(Some(remote.clone()));

        assert_eq!(source, TranscriptSource::Remote);
        assert_eq!(entries, remote);
    }

    #[test]
    fn test_live_transcript_is_fallback() {
        let mut transcript = TranscriptAssembler::new();
        transcript.append(Speaker::Agent, "live question");

        let (entries, source) = transcript.resolve(None);
        assert_eq!(source, TranscriptSource::Live);
        assert_eq!(entries.len(), 1);

        let (_, source) = transcript.resolve(Some(Vec::new()));
        assert_eq!(source, TranscriptSource::Live);
    }

    #[test]
    fn test_render_entries_sorts_by_order() {
        let entries = vec![
            TranscriptEntry { speaker: Speaker::User, text: "second".into(), order: 1 },
            TranscriptEntry { speaker: Speaker::Agent, text: "first".into(), order: 0 },
        ];
        assert_eq!(render_entries(&entries), "Agent: first\nUser: second");
    }
}
