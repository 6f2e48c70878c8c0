//! Title normalization for duplicate detection.
//!
//! Turns a raw project title into the key that both clustering passes
//! compare. Keys are never written back to the store.
//!
//! CRITICAL: changing anything here changes which projects get merged.
//! Run the tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Anything that is neither a word character nor whitespace
pub static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Letters glued to a run of digits: "connect4" → "connect" + "4"
pub static GLUED_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\W\d]+)(\d+)").unwrap());

// ============================================================================
// WORD LISTS
// ============================================================================

/// English spellings of the single digits, indexed by value
pub const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Filler words dropped from keys
pub static STOPWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    ["a", "an", "the", "and", "or", "but", "game"]
        .into_iter()
        .collect()
});

// ============================================================================
// NUMBER HANDLING
// ============================================================================

/// How single-digit numbers are canonicalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NumberStyle {
    /// Digits become words and words become digits ("4" ↔ "four").
    /// The two spellings of one number never share a key in this mode.
    #[default]
    Swap,
    /// Both spellings become the digit, so "Connect4" and "Connect Four" agree.
    Digits,
}

fn digit_for_word(token: &str) -> Option<usize> {
    DIGIT_WORDS.iter().position(|w| *w == token)
}

fn word_for_digit(token: &str) -> Option<&'static str> {
    match token.as_bytes() {
        [d @ b'0'..=b'9'] => Some(DIGIT_WORDS[(d - b'0') as usize]),
        _ => None,
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

fn canonical_token(token: &str, style: NumberStyle) -> String {
    match style {
        NumberStyle::Swap => {
            if is_numeric(token) {
                word_for_digit(token).unwrap_or(token).to_string()
            } else if let Some(d) = digit_for_word(token) {
                d.to_string()
            } else {
                token.to_string()
            }
        }
        NumberStyle::Digits => match digit_for_word(token) {
            Some(d) => d.to_string(),
            None => token.to_string(),
        },
    }
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title into its comparison key using the documented
/// digit/word swap.
pub fn normalize_title(title: &str) -> String {
    normalize_title_with(title, NumberStyle::Swap)
}

/// Normalize a title into its comparison key.
///
/// Lowercases, strips punctuation, splits letters from trailing digits,
/// canonicalizes single digits per `style`, drops stopwords and re-joins
/// with single spaces. Never fails; degenerate input gives "".
pub fn normalize_title_with(title: &str, style: NumberStyle) -> String {
    let lowered = title.trim().to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let split = GLUED_DIGITS.replace_all(&stripped, "$1 $2");

    split
        .split_whitespace()
        .map(|token| canonical_token(token, style))
        .filter(|token| !STOPWORDS.contains(token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================
