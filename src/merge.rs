//! Field-level merge of duplicate projects.

use crate::models::Record;
use crate::scoring::is_truthy;

/// Fill gaps in `base` from `incoming`.
///
/// A field is copied when `base` lacks it entirely, or when `base` holds an
/// empty value and `incoming` holds a filled one. Filled fields on `base` are
/// never overwritten and `base.id` is kept; recording `incoming.id` as
/// absorbed is the caller's job.
///
/// Returns the names of the fields that were copied, in `incoming` order.
pub fn merge_into(base: &mut Record, incoming: Record) -> Vec<String> {
    let mut filled = Vec::new();

    for (key, value) in incoming.fields {
        let take = match base.fields.get(&key) {
            None => true,
            Some(existing) => !is_truthy(existing) && is_truthy(&value),
        };
        if take {
            filled.push(key.clone());
            base.fields.insert(key, value);
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::completeness;
    use serde_json::{json, Value};

    fn record(id: &str, doc: Value) -> Record {
        Record::from_document(id, doc).unwrap()
    }

    #[test]
    fn test_fills_missing_and_empty_fields() {
        let mut base = record(
            "p1",
            json!({"title": "Snake", "description": "", "github_url": null}),
        );
        let incoming = record(
            "p2",
            json!({
                "title": "snake",
                "description": "Classic arcade game",
                "github_url": "https://github.com/x/snake",
                "year": 2021
            }),
        );

        let filled = merge_into(&mut base, incoming);

        assert_eq!(filled, vec!["description", "github_url", "year"]);
        assert_eq!(base.id, "p1");
        assert_eq!(base.title(), "Snake");
        assert_eq!(base.get("year"), Some(&json!(2021)));
    }

    #[test]
    fn test_never_overwrites_filled_fields() {
        let mut base = record("p1", json!({"title": "Snake", "featured": true, "year": 2020}));
        let incoming = record("p2", json!({"title": "SNAKE", "featured": false, "year": 2024}));

        let filled = merge_into(&mut base, incoming);

        assert!(filled.is_empty());
        assert_eq!(base.get("featured"), Some(&json!(true)));
        assert_eq!(base.get("year"), Some(&json!(2020)));
    }

    #[test]
    fn test_empty_does_not_replace_empty() {
        let mut base = record("p1", json!({"title": "Snake", "gallery": []}));
        let incoming = record("p2", json!({"gallery": {}, "tags": []}));

        let filled = merge_into(&mut base, incoming);

        // Absent fields are copied even when empty; present empties stay put
        assert_eq!(filled, vec!["tags"]);
        assert_eq!(base.get("gallery"), Some(&json!([])));
    }

    #[test]
    fn test_completeness_never_decreases() {
        let a = record("a", json!({"title": "Weather", "year": 0, "status": "Live"}));
        let b = record("b", json!({"title": "weather", "year": 2022, "slug": ""}));
        let (ca, cb) = (completeness(&a), completeness(&b));

        let mut ab = a.clone();
        merge_into(&mut ab, b.clone());
        assert!(completeness(&ab) >= ca.max(cb));

        let mut ba = b;
        merge_into(&mut ba, a);
        assert!(completeness(&ba) >= ca.max(cb));
    }
}
