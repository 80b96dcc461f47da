//! Incremental extraction of a structured JSON payload embedded in a
//! streamed answer.
//!
//! The assistant is instructed to reply with prose followed by a single JSON
//! object describing file operations. Tokens arrive one at a time with no
//! delimiter between the two. The extractor scans character by character,
//! tracking brace depth and string state, so a candidate object is detected
//! the moment it balances — without re-parsing the whole buffer on every
//! token, and without being fooled by braces inside string literals.

use thiserror::Error;

/// What fed text turned into. One token can yield several events, e.g. the
/// tail of a payload followed by more prose.
#[derive(Debug)]
pub enum ExtractorEvent {
    /// Visible answer text, to be appended to the transcript.
    Prose(String),
    /// A complete, syntactically valid JSON document, withheld from the
    /// transcript. Structural validation happens downstream.
    Payload(String),
    /// A brace-balanced block that is not valid JSON. Its text was withheld
    /// from the transcript, so the caller must surface the failure.
    Invalid(ExtractError),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The block balanced its braces but did not parse.
    #[error("assistant emitted a malformed JSON block: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    /// The stream ended with an unclosed brace; everything after it was
    /// swallowed. Typically a stray `{` in ordinary prose.
    #[error("response ended inside an unterminated JSON block ({buffered} bytes buffered)")]
    UnterminatedJson { buffered: usize },
}

/// Stateful token scanner. Feed it answer tokens in arrival order; reasoning
/// tokens must not be fed here.
#[derive(Default)]
pub struct JsonStreamExtractor {
    buffer: String,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl JsonStreamExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a payload candidate is currently buffered.
    pub fn capturing(&self) -> bool {
        self.depth > 0
    }

    /// Consume one answer token, emitting events in textual order.
    pub fn feed(&mut self, token: &str) -> Vec<ExtractorEvent> {
        let mut events = Vec::new();
        let mut prose = String::new();

        for ch in token.chars() {
            if !self.capturing() {
                if ch == '{' {
                    if !prose.is_empty() {
                        events.push(ExtractorEvent::Prose(std::mem::take(&mut prose)));
                    }
                    self.buffer.push(ch);
                    self.depth = 1;
                    self.in_string = false;
                    self.escaped = false;
                } else {
                    prose.push(ch);
                }
                continue;
            }

            self.buffer.push(ch);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        events.push(self.complete_candidate());
                    }
                }
                _ => {}
            }
        }

        if !prose.is_empty() {
            events.push(ExtractorEvent::Prose(prose));
        }
        events
    }

    /// Signal end of stream. An unclosed candidate is a terminal error,
    /// because its text was never shown to the user.
    pub fn finish(&mut self) -> Result<(), ExtractError> {
        if !self.capturing() {
            return Ok(());
        }
        let buffered = self.buffer.len();
        tracing::warn!(buffered, "stream ended inside an unclosed JSON block");
        self.reset();
        Err(ExtractError::UnterminatedJson { buffered })
    }

    fn complete_candidate(&mut self) -> ExtractorEvent {
        let raw = std::mem::take(&mut self.buffer);
        self.reset();
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(_) => ExtractorEvent::Payload(raw),
            Err(e) => ExtractorEvent::Invalid(ExtractError::MalformedPayload(e)),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}
