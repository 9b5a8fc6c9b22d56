//! Lexical metrics shared by the baseline engine and deviation scorer

use regex::{Regex, RegexBuilder};

/// Word count and average sentence length of a message body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMetrics {
    pub word_count: usize,
    pub avg_sentence_length: f64,
}

/// Compute word count and average sentence length. Sentences are split on
/// runs of `.`, `!`, `?`; empty pieces are discarded and the divisor is
/// never below 1.
pub fn body_metrics(body: &str) -> BodyMetrics {
    let word_count = body.split_whitespace().count();
    let sentence_count = body
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    BodyMetrics {
        word_count,
        avg_sentence_length: word_count as f64 / sentence_count.max(1) as f64,
    }
}

/// Formality estimator over formal/informal linguistic markers.
///
/// Score is the ratio of formal-marker hits to total hits, 0.5 when neither
/// side matches.
pub struct FormalityScorer {
    formal: Vec<Regex>,
    informal: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("static formality pattern")
        })
        .collect()
}

impl FormalityScorer {
    pub fn new() -> Self {
        Self {
            formal: compile(&[
                r"\b(dear|sincerely|regards|respectfully|kindly|hereby|pursuant)\b",
                r"\b(please\s+find|attached\s+herewith|as\s+per|for\s+your\s+reference)\b",
                r"\b(best\s+regards|warm\s+regards|yours\s+(truly|faithfully|sincerely))\b",
            ]),
            informal: compile(&[
                r"\b(hey|hi|yo|sup|gonna|wanna|gotta|lol|haha|btw|fyi|thx|ty)\b",
                r"\b(awesome|cool|sweet|dude|bro|mate|cheers)\b",
            ]),
        }
    }

    /// Score text in [0, 1]: 0 = very informal, 1 = very formal.
    pub fn score(&self, text: &str) -> f64 {
        let formal_hits = self.formal.iter().filter(|p| p.is_match(text)).count();
        let informal_hits = self.informal.iter().filter(|p| p.is_match(text)).count();
        let total = formal_hits + informal_hits;
        if total == 0 {
            return 0.5;
        }
        formal_hits as f64 / total as f64
    }
}

impl Default for FormalityScorer {
    fn default() -> Self {
        Self::new()
    }
}
