//! Incremental transcript assembly.
//!
//! The server revises the tail of the transcript while a sentence is in
//! flight. Interim text is therefore *replaced* wholesale on every
//! TranscriptionResultChanged and only promoted into the permanent prefix
//! on SentenceEnd; appending interim updates would double text under some
//! event orderings.

/// Committed prefix plus a replaceable interim suffix.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TranscriptState {
    committed: String,
    interim: String,
    finalized: bool,
}

impl TranscriptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the interim suffix. Does not touch committed text.
    pub fn replace_interim(&mut self, text: &str) {
        self.interim.clear();
        self.interim.push_str(text);
    }

    /// Commit a final sentence into the permanent prefix and clear the
    /// interim. When the event carries no text, the current interim is
    /// committed instead.
    pub fn commit_sentence(&mut self, text: &str) {
        let sentence = if text.is_empty() { &self.interim } else { text };
        if !sentence.is_empty() {
            if !self.committed.is_empty() {
                self.committed.push(' ');
            }
            self.committed.push_str(sentence);
        }
        self.interim.clear();
    }

    /// Mark the transcript final; no further revisions are expected.
    /// Any leftover interim is committed first.
    pub fn finalize(&mut self) {
        if !self.interim.is_empty() {
            let interim = std::mem::take(&mut self.interim);
            self.commit_sentence(&interim);
        }
        self.finalized = true;
    }

    /// Whether `finalize` has been called.
    pub fn is_final(&self) -> bool {
        self.finalized
    }

    /// Current best text: committed prefix plus interim suffix.
    pub fn current(&self) -> String {
        if self.interim.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.committed, self.interim)
        }
    }

    /// The committed prefix only.
    pub fn committed(&self) -> &str {
        &self.committed
    }
}
