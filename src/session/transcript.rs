//! # Transcript Aggregation
//!
//! Partial transcripts stream in as small deltas for both sides of the
//! conversation. They are buffered per turn and only become transcript
//! lines when the transport signals that the turn is complete.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// One finalized line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    /// When the turn completed
    pub at: DateTime<Utc>,
}

impl fmt::Display for TranscriptLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// Buffers for the turn in progress.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnTranscript {
    user: String,
    model: String,
}

impl TurnTranscript {
    pub fn push_user(&mut self, delta: &str) {
        self.user.push_str(delta);
    }

    pub fn push_model(&mut self, delta: &str) {
        self.model.push_str(delta);
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.model.is_empty()
    }

    /// Close the turn.
    ///
    /// Returns the user line followed by the assistant line, or nothing when
    /// neither side said anything. Both buffers are empty afterwards.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Vec<TranscriptLine> {
        if self.is_empty() {
            return Vec::new();
        }
        let user = std::mem::take(&mut self.user);
        let model = std::mem::take(&mut self.model);
        vec![
            TranscriptLine { speaker: Speaker::User, text: user, at },
            TranscriptLine { speaker: Speaker::Assistant, text: model, at },
        ]
    }

    /// Drop an unfinished turn.
    pub fn discard(&mut self) {
        self.user.clear();
        self.model.clear();
    }
}

/// Append-only, ordered conversation log.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    lines: Vec<TranscriptLine>,
}

impl TranscriptLog {
    pub fn append(&mut self, lines: impl IntoIterator<Item = TranscriptLine>) {
        self.lines.extend(lines);
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_assembly() {
        let mut turn = TurnTranscript::default();
        turn.push_user("Hel");
        turn.push_user("lo");
        turn.push_model("Hi");

        let lines = turn.complete(Utc::now());
        let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();

        assert_eq!(rendered, vec!["user: Hello", "assistant: Hi"]);
        assert!(turn.is_empty());
        assert_eq!(turn.user(), "");
        assert_eq!(turn.model(), "");
    }

    #[test]
    fn test_empty_turn_emits_nothing() {
        let mut turn = TurnTranscript::default();
        assert!(turn.complete(Utc::now()).is_empty());
    }

    #[test]
    fn test_one_sided_turn_still_emits_both_lines() {
        let mut turn = TurnTranscript::default();
        turn.push_model("Anyone there?");

        let lines = turn.complete(Utc::now());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].speaker, Speaker::User);
        assert_eq!(lines[0].text, "");
        assert_eq!(lines[1].to_string(), "assistant: Anyone there?");
    }

    #[test]
    fn test_log_keeps_order() {
        let mut log = TranscriptLog::default();
        let mut turn = TurnTranscript::default();

        turn.push_user("one");
        log.append(turn.complete(Utc::now()));
        turn.push_user("two");
        log.append(turn.complete(Utc::now()));

        let texts: Vec<&str> = log.lines().iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "", "two", ""]);
    }

    #[test]
    fn test_discard_clears_pending_turn() {
        let mut turn = TurnTranscript::default();
        turn.push_user("half a sent");
        turn.discard();
        assert!(turn.is_empty());
    }

    #[test]
    fn test_line_serializes_lowercase_speaker() {
        let line = TranscriptLine { speaker: Speaker::Assistant, text: "Hi".into(), at: Utc::now() };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["speaker"], "assistant");
        assert_eq!(json["text"], "Hi");
    }
}
