//! Housekeeping passes over the project collection: slug backfill,
//! technologies repair and field coverage reporting.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::models::Record;
use crate::scoring::is_truthy;

// ============================================================================
// Slugs
// ============================================================================

/// Anything that is not a word character, whitespace or a hyphen
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// Runs of hyphens and whitespace collapse to a single hyphen
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// URL slug for a title: "My Cool App!" -> "my-cool-app".
pub fn create_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(lowered.trim(), "");
    SLUG_SEPARATORS.replace_all(&stripped, "-").into_owned()
}

/// Slugs to assign: one per record whose slug is missing or empty and whose
/// title is non-empty. Records keep their input order.
pub fn slug_updates(records: &[Record]) -> Vec<(String, String)> {
    records
        .iter()
        .filter(|r| !r.get("slug").is_some_and(is_truthy))
        .filter(|r| !r.title().is_empty())
        .map(|r| (r.id.clone(), create_slug(r.title())))
        .collect()
}

// ============================================================================
// Technologies
// ============================================================================

/// Repair a `technologies` value that is not a list.
///
/// Returns `None` when the value is already an array. A non-empty string is
/// split on commas with each entry trimmed; anything else becomes `[]`.
pub fn coerce_technologies(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Array(_)) => None,
        Some(Value::String(s)) if !s.is_empty() => Some(Value::Array(
            s.split(',')
                .map(|t| Value::String(t.trim().to_string()))
                .collect(),
        )),
        _ => Some(Value::Array(Vec::new())),
    }
}

// ============================================================================
// Field Coverage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCoverage {
    pub field: String,
    pub present: usize,
    pub filled: usize,
}

impl FieldCoverage {
    /// Filled share of all records, as a percentage
    pub fn filled_rate(&self, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            100.0 * self.filled as f64 / total as f64
        }
    }
}

/// Per-field presence and fill counts, sorted by field name.
pub fn field_coverage(records: &[Record]) -> Vec<FieldCoverage> {
    let mut counts: FxHashMap<&str, (usize, usize)> = FxHashMap::default();
    for record in records {
        for (key, value) in &record.fields {
            let entry = counts.entry(key.as_str()).or_default();
            entry.0 += 1;
            if is_truthy(value) {
                entry.1 += 1;
            }
        }
    }

    let mut coverage: Vec<FieldCoverage> = counts
        .into_iter()
        .map(|(field, (present, filled))| FieldCoverage {
            field: field.to_string(),
            present,
            filled,
        })
        .collect();
    coverage.sort_by(|a, b| a.field.cmp(&b.field));
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, doc: Value) -> Record {
        Record::from_document(id, doc).unwrap()
    }

    #[test]
    fn test_create_slug() {
        assert_eq!(create_slug("My Cool App!"), "my-cool-app");
        assert_eq!(create_slug("  Tic-Tac-Toe  "), "tic-tac-toe");
        assert_eq!(create_slug("C++ & Rust -- notes"), "c-rust-notes");
        assert_eq!(create_slug("snake_game v2"), "snake_game-v2");
        assert_eq!(create_slug(""), "");
    }

    #[test]
    fn test_slug_updates_only_fill_gaps() {
        let records = vec![
            record("p1", json!({"title": "Weather App"})),
            record("p2", json!({"title": "Snake", "slug": "snake-game"})),
            record("p3", json!({"title": "Portfolio Site", "slug": ""})),
            record("p4", json!({"title": ""})),
            record("p5", json!({"slug": null})),
        ];
        assert_eq!(
            slug_updates(&records),
            vec![
                ("p1".to_string(), "weather-app".to_string()),
                ("p3".to_string(), "portfolio-site".to_string()),
            ]
        );
    }

    #[test]
    fn test_coerce_technologies() {
        assert_eq!(coerce_technologies(Some(&json!(["rust"]))), None);
        assert_eq!(
            coerce_technologies(Some(&json!("React, Node.js ,Firebase"))),
            Some(json!(["React", "Node.js", "Firebase"]))
        );
        assert_eq!(coerce_technologies(Some(&json!(""))), Some(json!([])));
        assert_eq!(coerce_technologies(Some(&json!(null))), Some(json!([])));
        assert_eq!(coerce_technologies(Some(&json!({"a": 1}))), Some(json!([])));
        assert_eq!(coerce_technologies(None), Some(json!([])));
    }

    #[test]
    fn test_field_coverage() {
        let records = vec![
            record("p1", json!({"title": "Snake", "year": 2020})),
            record("p2", json!({"title": "Todo", "year": 0, "gallery": []})),
            record("p3", json!({"title": ""})),
        ];
        let coverage = field_coverage(&records);
        let fields: Vec<&str> = coverage.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["gallery", "title", "year"]);

        assert_eq!(coverage[1], FieldCoverage { field: "title".into(), present: 3, filled: 2 });
        assert_eq!(coverage[2].present, 2);
        assert_eq!(coverage[2].filled, 1);
        assert!((coverage[1].filled_rate(records.len()) - 200.0 / 3.0).abs() < 1e-9);
        assert!(field_coverage(&[]).is_empty());
    }
}
