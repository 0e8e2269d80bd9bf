//! Rule-based sentence boundary detection.
//!
//! Implements [`SentenceSegmenter`] with a char-walk splitter: a sentence
//! ends at terminal punctuation (plus any closing quotes/brackets), followed
//! by whitespace and an upper-case/digit/opening character — unless the
//! punctuation terminates a known abbreviation or an author initial. Offsets
//! are char-based; trailing whitespace belongs to the preceding sentence, so
//! ends are cumulative and the final end equals the input's char length.

use once_cell::sync::Lazy;
use regex::Regex;

use citectx_core::{SegmentError, Sentence, SentenceSegmenter};

/// Trailing token patterns whose period does not end a sentence:
/// common scholarly abbreviations, and single-letter initials.
static ABBREVIATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:e\.g|i\.e|et\s+al|cf|etc|vs|viz|resp|approx|fig|figs|eq|eqs|sec|secs|no|nos|vol|pp|ca|dr|mr|mrs|ms|prof|jr|st)|^[A-Za-z]|[\s(\[][A-Za-z])\.$",
    )
    .unwrap()
});

pub struct RuleSegmenter;

impl RuleSegmenter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuleSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter for RuleSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentError> {
        if text.trim().is_empty() {
            return Err(SegmentError::EmptyInput);
        }

        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        let mut sentences = Vec::new();
        let mut start = 0usize;
        let mut i = 0usize;

        while i < n {
            if is_terminal(chars[i]) && !guarded_period(&chars, start, i) {
                // Absorb closing quotes/brackets after the terminator.
                let mut end = i + 1;
                while end < n && is_closer(chars[end]) {
                    end += 1;
                }
                // Whitespace run; the next sentence starts where it ends.
                let mut next = end;
                while next < n && chars[next].is_whitespace() {
                    next += 1;
                }

                let at_boundary = next == n || (next > end && opens_sentence(chars[next]));
                if at_boundary {
                    let raw: String = chars[start..end].iter().collect();
                    sentences.push(Sentence {
                        text: raw.trim().to_string(),
                        end: next,
                    });
                    start = next;
                    i = next;
                    continue;
                }
            }
            i += 1;
        }

        if start < n {
            let raw: String = chars[start..].iter().collect();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                if let Some(last) = sentences.last_mut() {
                    last.end = n;
                }
            } else {
                sentences.push(Sentence {
                    text: trimmed.to_string(),
                    end: n,
                });
            }
        }

        Ok(sentences)
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

fn opens_sentence(c: char) -> bool {
    c.is_uppercase() || c.is_numeric() || matches!(c, '"' | '\'' | '(' | '[' | '\u{201c}' | '\u{2018}')
}

/// A period ending an abbreviation or initial does not close the sentence.
fn guarded_period(chars: &[char], start: usize, i: usize) -> bool {
    if chars[i] != '.' {
        return false;
    }
    let prefix: String = chars[start..=i].iter().collect();
    ABBREVIATION_RE.is_match(&prefix)
}
