//! Rule-based positivity filter applied to every post before it is stored.
//!
//! The rules are fixed: a list of negative words matched as substrings of the
//! lowercased text, and two negation patterns. There is no scoring.

use regex::Regex;
use std::sync::OnceLock;

pub const NEGATIVE_WORDS: &[&str] = &[
    "hate", "stupid", "idiot", "awful", "terrible", "horrible", "sucks", "worst", "fail",
    "loser", "pathetic",
];

const NEGATIVE_PATTERNS: &[&str] = &[
    r"\b(not|never|can't|won't|don't|couldn't|shouldn't)\b.*\b(good|great|amazing|awesome)\b",
    r"\b(everything|nothing).*\b(wrong|bad|terrible)\b",
];

pub const REJECTION_MESSAGE: &str =
    "Please keep your post positive! Try sharing something you're grateful for or a small win.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    NegativeWord(&'static str),
    NegativePattern,
}

impl Violation {
    pub fn reason(&self) -> &'static str {
        match self {
            Violation::NegativeWord(_) => "negative_word",
            Violation::NegativePattern => "negative_pattern",
        }
    }
}

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        NEGATIVE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("positivity pattern"))
            .collect()
    })
}

pub fn find_violation(text: &str) -> Option<Violation> {
    let lowered = text.to_lowercase();

    if let Some(word) = NEGATIVE_WORDS.iter().find(|word| lowered.contains(*word)) {
        return Some(Violation::NegativeWord(word));
    }

    if patterns().iter().any(|regex| regex.is_match(&lowered)) {
        return Some(Violation::NegativePattern);
    }

    None
}

pub fn check_positivity(text: &str) -> bool {
    find_violation(text).is_none()
}
