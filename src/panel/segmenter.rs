//! Sentence segmentation for streamed text
//!
//! Accumulates stream deltas into a rolling buffer and emits
//! sentence-bounded segments for TTS synthesis. Emission is invariant to
//! how a sentence is chunked across deltas: interior boundaries are cut as
//! soon as the following character arrives, and a terminator at the very
//! end of the buffer emits immediately. The 500 ms idle flush is driven by
//! the panel's stream loop, which calls [`SentenceSegmenter::flush`].

use regex::Regex;

/// Stateful sentence aggregator
pub struct SentenceSegmenter {
    buffer: String,
    trailing_boundary: Regex,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            trailing_boundary: Regex::new(r"[.!?]\s*$").expect("static regex"),
        }
    }

    /// Append a delta and return any segments completed by it
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut segments = split_complete_sentences(&mut self.buffer);

        // A terminator at the buffer's end completes the segment without
        // waiting for the next delta.
        if self.trailing_boundary.is_match(&self.buffer) {
            let rest = std::mem::take(&mut self.buffer);
            let rest = rest.trim();
            if !rest.is_empty() {
                segments.push(rest.to_string());
            }
        }
        segments
    }

    /// Emit the residual buffer, if any. Called on the idle timeout and at
    /// stream end.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut every interior sentence boundary out of `buffer`: a run of `.`/`!`/`?`
/// followed by whitespace ends a sentence. The incomplete tail stays in the
/// buffer.
fn split_complete_sentences(buffer: &mut String) -> Vec<String> {
    let mut segments = Vec::new();
    loop {
        let chars: Vec<(usize, char)> = buffer.char_indices().collect();
        let mut cut_at = None;
        let mut i = 0;
        while i < chars.len() {
            if is_terminator(chars[i].1) {
                // Consume the full terminator run
                let mut j = i + 1;
                while j < chars.len() && is_terminator(chars[j].1) {
                    j += 1;
                }
                // Boundary only when whitespace follows; end-of-buffer is
                // handled by the caller's trailing check.
                if j < chars.len() && chars[j].1.is_whitespace() {
                    let mut k = j;
                    while k < chars.len() && chars[k].1.is_whitespace() {
                        k += 1;
                    }
                    if k < chars.len() {
                        cut_at = Some((chars[j].0, chars[k].0));
                        break;
                    }
                }
                i = j;
            } else {
                i += 1;
            }
        }

        match cut_at {
            Some((sentence_end, rest_start)) => {
                let sentence = buffer[..sentence_end].trim().to_string();
                *buffer = buffer[rest_start..].to_string();
                if !sentence.is_empty() {
                    segments.push(sentence);
                }
            }
            None => break,
        }
    }
    segments
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}
