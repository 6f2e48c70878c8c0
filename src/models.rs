//! Core data models for project deduplication.
//!
//! This module contains the record, cluster and changeset types plus the
//! run statistics shared by the engine, the store and the CLI.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::merge::merge_into;

// ============================================================================
// Type Aliases
// ============================================================================

/// Index mapping a normalized title key to its cluster index in Vec<Cluster>
pub type KeyIndex = FxHashMap<String, usize>;

/// Project document body (everything except the store-assigned id)
pub type Fields = Map<String, Value>;

// ============================================================================
// Records
// ============================================================================

/// A project entry as sourced from the document store.
///
/// The id lives outside `fields`; a stray `"id"` key inside the document is
/// dropped on construction so the store id always wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, mut fields: Fields) -> Self {
        fields.shift_remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from a JSON document. Anything but an object is rejected.
    pub fn from_document(id: impl Into<String>, doc: Value) -> Result<Self> {
        let id = id.into();
        match doc {
            Value::Object(fields) => Ok(Self::new(id, fields)),
            other => bail!(
                "Project '{}' is not a JSON object (found {})",
                id,
                json_kind(&other)
            ),
        }
    }

    /// Title as a string slice; missing or non-string titles read as "".
    pub fn title(&self) -> &str {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Clusters
// ============================================================================

/// Working group of records believed to be one logical project.
///
/// `key` is the normalized title of the record that founded the cluster.
/// Unclusterable clusters (empty key, or retained untitled records) never
/// take part in matching and never absorb anything.
#[derive(Clone, Debug, Default)]
pub struct Cluster {
    pub key: String,
    pub canonical: Record,
    pub absorbed: Vec<String>,
    pub clusterable: bool,
}

impl Cluster {
    pub fn new(key: String, canonical: Record) -> Self {
        Self {
            key,
            canonical,
            absorbed: Vec::new(),
            clusterable: true,
        }
    }

    pub fn unclusterable(canonical: Record) -> Self {
        Self {
            key: String::new(),
            canonical,
            absorbed: Vec::new(),
            clusterable: false,
        }
    }

    /// Fold a single record into the canonical and remember its id.
    /// Returns the names of fields that were filled in.
    pub fn absorb(&mut self, record: Record) -> Vec<String> {
        self.absorbed.push(record.id.clone());
        merge_into(&mut self.canonical, record)
    }

    /// Fold a whole cluster: its canonical is merged and every id it had
    /// absorbed carries over.
    pub fn absorb_cluster(&mut self, other: Cluster) -> Vec<String> {
        let Cluster {
            canonical, absorbed, ..
        } = other;
        let filled = self.absorb(canonical);
        self.absorbed.extend(absorbed);
        filled
    }

    /// Number of input records this cluster stands for.
    pub fn size(&self) -> usize {
        1 + self.absorbed.len()
    }
}

// ============================================================================
// Changeset
// ============================================================================

/// Final output of a run: canonical documents to write and ids to delete.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    pub upserts: BTreeMap<String, Record>,
    pub deletions: BTreeSet<String>,
}

impl Changeset {
    /// True when applying would remove at least one duplicate.
    pub fn has_merges(&self) -> bool {
        !self.deletions.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }

    /// Check that upserts and deletions together cover exactly `expected`,
    /// with no id on both sides.
    pub fn verify_accounts<'a>(&self, expected: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if let Some(id) = self.deletions.iter().find(|id| self.upserts.contains_key(*id)) {
            bail!("Project '{}' is both kept and deleted", id);
        }

        let expected: BTreeSet<&str> = expected.into_iter().collect();
        let accounted = self.upserts.len() + self.deletions.len();

        for id in &expected {
            if !self.upserts.contains_key(*id) && !self.deletions.contains(*id) {
                bail!("Project '{}' is neither kept nor deleted", id);
            }
        }
        if accounted != expected.len() {
            bail!(
                "Changeset accounts for {} projects but {} were expected",
                accounted,
                expected.len()
            );
        }
        Ok(())
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run counters, logged as JSON like the other phase stats.
#[derive(Default, Debug, Clone, Serialize)]
pub struct MergeStats {
    // Input
    pub records: usize,
    pub untitled: usize,
    pub unclusterable: usize,

    // Pass 1: exact key grouping
    pub clusters_after_exact: usize,
    pub exact_merges: usize,

    // Pass 2: similarity grouping
    pub comparisons: usize,
    pub similar_merges: usize,
    pub components: usize, // Multi-member components (component strategy only)

    // Output
    pub survivors: usize,
    pub deletions: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl MergeStats {
    /// Share of titled records that turned out to be duplicates, as a percentage
    pub fn duplicate_rate(&self) -> f64 {
        let titled = self.records - self.untitled;
        if titled == 0 {
            0.0
        } else {
            100.0 * self.deletions as f64 / titled as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, doc: Value) -> Record {
        Record::from_document(id, doc).unwrap()
    }

    #[test]
    fn test_record_drops_inner_id() {
        let r = record("doc1", json!({"id": "office_1", "title": "Meltcrete"}));
        assert_eq!(r.id, "doc1");
        assert!(r.get("id").is_none());
        assert_eq!(r.title(), "Meltcrete");
    }

    #[test]
    fn test_record_keeps_field_order() {
        let r = record(
            "doc1",
            json!({"id": "x", "title": "Snake", "slug": "snake", "year": 2020}),
        );
        let keys: Vec<&str> = r.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "slug", "year"]);
    }

    #[test]
    fn test_record_title_fallbacks() {
        assert_eq!(record("a", json!({})).title(), "");
        assert_eq!(record("b", json!({"title": 42})).title(), "");
        assert!(Record::from_document("c", json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_absorb_cluster_carries_ids() {
        let mut left = Cluster::new("snake".into(), record("p1", json!({"title": "Snake"})));
        left.absorb(record("p2", json!({"title": "snake", "year": 2020})));

        let mut right = Cluster::new("snakes".into(), record("p3", json!({"title": "Snakes"})));
        right.absorb(record("p4", json!({"title": "snakes"})));

        left.absorb_cluster(right);
        assert_eq!(left.absorbed, vec!["p2", "p3", "p4"]);
        assert_eq!(left.size(), 4);
        assert_eq!(left.canonical.get("year"), Some(&json!(2020)));
    }

    #[test]
    fn test_verify_accounts() {
        let mut cs = Changeset::default();
        cs.upserts.insert("p1".into(), record("p1", json!({"title": "A"})));
        cs.deletions.insert("p2".into());

        assert!(cs.verify_accounts(["p1", "p2"]).is_ok());
        assert!(cs.verify_accounts(["p1", "p2", "p3"]).is_err());
        assert!(cs.verify_accounts(["p1"]).is_err());

        cs.deletions.insert("p1".into());
        let err = cs.verify_accounts(["p1", "p2"]).unwrap_err();
        assert!(err.to_string().contains("both kept and deleted"));
    }

    #[test]
    fn test_duplicate_rate() {
        let stats = MergeStats {
            records: 12,
            untitled: 2,
            deletions: 4,
            ..Default::default()
        };
        assert!((stats.duplicate_rate() - 40.0).abs() < 1e-9);
        assert_eq!(MergeStats::default().duplicate_rate(), 0.0);
    }
}
