//! Scoring functions for project deduplication.
//!
//! This module contains:
//! - Title key similarity (Ratcliff/Obershelp matching blocks)
//! - Field truthiness and record completeness, which decide merge direction

use serde_json::Value;

use crate::models::Record;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Keys must score strictly above this to be treated as the same project
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Strict comparison against a threshold. A score equal to the threshold
/// does not match.
pub fn exceeds_threshold(score: f64, threshold: f64) -> bool {
    score > threshold
}

// ============================================================================
// Key Similarity
// ============================================================================

/// Longest common contiguous block within a[alo..ahi] and b[blo..bhi].
/// Returns (start in a, start in b, length). Ties go to the block that
/// starts earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);

    // run[t] is the length of the match ending at a[i-1], b[blo + t - 1]
    let width = bhi - blo + 1;
    let mut prev = vec![0usize; width];
    let mut run = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let t = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[t - 1] + 1;
                run[t] = k;
                if k > best_len {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_len = k;
                }
            } else {
                run[t] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut run);
    }

    (best_i, best_j, best_len)
}

/// Total characters covered by matching blocks: take the longest block,
/// then recurse into what is left on either side of it.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![((0, a.len()), (0, b.len()))];

    while let Some(((alo, ahi), (blo, bhi))) = pending.pop() {
        let (i, j, k) = longest_match(a, b, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push(((alo, i), (blo, j)));
        }
        if i + k < ahi && j + k < bhi {
            pending.push(((i + k, ahi), (j + k, bhi)));
        }
    }

    total
}

/// Compute similarity between two normalized keys (0.0 to 1.0).
///
/// ratio = 2 * matched / (len(a) + len(b)), counted in chars. Arguments are
/// put in a fixed order first so the score does not depend on call order.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let first: Vec<char> = first.chars().collect();
    let second: Vec<char> = second.chars().collect();
    let total = first.len() + second.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matched_chars(&first, &second) as f64 / total as f64
}

// ============================================================================
// Completeness
// ============================================================================

/// Whether a field value counts as filled in.
/// null, false, 0, "", [] and {} are all empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Count of filled-in fields on a record.
pub fn completeness(record: &Record) -> usize {
    record.fields.values().filter(|v| is_truthy(v)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_similarity_identical_and_disjoint() {
        assert_eq!(similarity("snake", "snake"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_similarity_known_values() {
        // "foo ba" is the only block
        assert!(approx(similarity("foo bar", "foo baz"), 12.0 / 14.0));
        // blocks "tic", "tac", "toe" after the space-free variant
        assert!(approx(similarity("tic tac toe", "tictactoe"), 18.0 / 20.0));
        // one shared char out of eight
        assert!(approx(similarity("todo", "blog"), 2.0 / 8.0));
    }

    #[test]
    fn test_similarity_recurses_both_sides() {
        // longest block "bcd", then "a" on the left and "ef" on the right
        assert!(approx(similarity("abcdxef", "aybcdef"), 12.0 / 14.0));
    }

    #[test]
    fn test_similarity_threshold_boundary() {
        // seven shared chars over twenty total: exactly 0.7
        let score = similarity("abcdefghij", "abcdefgxyz");
        assert_eq!(score, 0.7);
        assert!(!exceeds_threshold(score, SIMILARITY_THRESHOLD));

        let score = similarity("abcdefghij", "abcdefghxy");
        assert!(approx(score, 0.8));
        assert!(exceeds_threshold(score, SIMILARITY_THRESHOLD));
    }

    #[test]
    fn test_similarity_symmetric() {
        let pairs = [
            ("weather app", "weather apps"),
            ("abab", "baba"),
            ("connect four", "connect 4"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_is_truthy() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&v), "{v} should be empty");
        }
        for v in [json!(true), json!(-1), json!(0.5), json!(" "), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&v), "{v} should be filled");
        }
    }

    #[test]
    fn test_completeness() {
        let record = Record::from_document(
            "p1",
            json!({
                "title": "Snake",
                "description": "",
                "featured": false,
                "year": 2021,
                "technologies": ["rust"],
                "gallery": []
            }),
        )
        .unwrap();
        assert_eq!(completeness(&record), 3);
    }
}
