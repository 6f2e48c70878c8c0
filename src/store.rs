//! SQLite-backed project document store.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE projects (
//!     seq   INTEGER PRIMARY KEY AUTOINCREMENT,
//!     id    TEXT NOT NULL UNIQUE,
//!     data  TEXT NOT NULL
//! );
//! ```
//!
//! `data` holds the project document as JSON, without its id. `seq` keeps
//! the insertion order, which is the order `fetch_all` hands records to the
//! engine. Changesets are applied in a single transaction: every upsert and
//! every deletion lands, or none do.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

use crate::models::{Changeset, Fields, Record};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS projects (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    id    TEXT NOT NULL UNIQUE,
    data  TEXT NOT NULL
);";

/// Top-level key of a snapshot file: `{"projects": {"<id>": {...}}}`
pub const SNAPSHOT_COLLECTION: &str = "projects";

pub struct ProjectStore {
    conn: Connection,
}

impl ProjectStore {
    /// Open (or create) a store database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open project store {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create projects table")?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Every project in insertion order.
    pub fn fetch_all(&self) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM projects ORDER BY seq")?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            records.push(decode(id, &data)?);
        }
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM projects WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| decode(id.to_string(), &d)).transpose()
    }

    /// Insert a new project or replace the stored document of an existing one.
    pub fn upsert(&self, record: &Record) -> Result<()> {
        upsert_in(&self.conn, record)
    }

    /// Apply all upserts and deletions atomically.
    pub fn apply_changeset(&mut self, changeset: &Changeset) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to start changeset transaction")?;

        for record in changeset.upserts.values() {
            upsert_in(&tx, record)
                .with_context(|| format!("Failed to write project '{}'", record.id))?;
        }
        {
            let mut stmt = tx.prepare_cached("DELETE FROM projects WHERE id = ?1")?;
            for id in &changeset.deletions {
                stmt.execute([id])
                    .with_context(|| format!("Failed to delete project '{}'", id))?;
            }
        }

        tx.commit().context("Failed to commit changeset")?;
        Ok(())
    }

    /// Set individual fields on one project, keeping the rest of its document.
    /// Returns false when the id is unknown.
    pub fn update_fields(&self, id: &str, fields: Fields) -> Result<bool> {
        let Some(mut record) = self.get(id)? else {
            return Ok(false);
        };
        for (key, value) in fields {
            record.fields.insert(key, value);
        }
        self.upsert(&record)?;
        Ok(true)
    }

    /// Remove every project whose `slug` equals `slug`. Returns how many went.
    pub fn delete_by_slug(&mut self, slug: &str) -> Result<usize> {
        let doomed: Vec<String> = self
            .fetch_all()?
            .into_iter()
            .filter(|r| r.get("slug").and_then(Value::as_str) == Some(slug))
            .map(|r| r.id)
            .collect();

        let changeset = Changeset {
            deletions: doomed.into_iter().collect(),
            ..Default::default()
        };
        self.apply_changeset(&changeset)?;
        Ok(changeset.deletions.len())
    }

    /// Load a snapshot file into the store. With `replace`, existing
    /// projects are removed first, in the same transaction.
    pub fn import_json(&mut self, path: &Path, replace: bool) -> Result<usize> {
        let records = read_snapshot(path)?;

        let tx = self.conn.transaction()?;
        if replace {
            tx.execute("DELETE FROM projects", [])?;
        }
        for record in &records {
            upsert_in(&tx, record)?;
        }
        tx.commit().context("Failed to commit import")?;

        Ok(records.len())
    }

    /// Write every project to a snapshot file.
    pub fn export_json(&self, path: &Path) -> Result<usize> {
        let records = self.fetch_all()?;
        write_snapshot(path, &records)?;
        Ok(records.len())
    }
}

fn decode(id: String, data: &str) -> Result<Record> {
    let doc: Value = serde_json::from_str(data)
        .with_context(|| format!("Project '{}' has an unreadable document", id))?;
    Record::from_document(id, doc)
}

fn upsert_in(conn: &Connection, record: &Record) -> Result<()> {
    let data = serde_json::to_string(&record.fields)?;
    conn.prepare_cached(
        "INSERT INTO projects (id, data) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )?
    .execute(params![record.id, data])?;
    Ok(())
}

// ============================================================================
// Snapshot files
// ============================================================================

/// Read `{"projects": {"<id>": {...}}}`. A bare `{"<id>": {...}}` map is
/// accepted as well. File order is kept.
pub fn read_snapshot(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let root: Value = serde_json::from_str(&text)
        .with_context(|| format!("Snapshot {} is not valid JSON", path.display()))?;

    let Value::Object(mut root) = root else {
        bail!("Snapshot {} must be a JSON object", path.display());
    };
    let projects = match root.remove(SNAPSHOT_COLLECTION) {
        Some(Value::Object(projects)) => projects,
        Some(_) => bail!(
            "Snapshot {}: '{}' must map ids to documents",
            path.display(),
            SNAPSHOT_COLLECTION
        ),
        None => root,
    };

    projects
        .into_iter()
        .map(|(id, doc)| Record::from_document(id, doc))
        .collect()
}

pub fn write_snapshot(path: &Path, records: &[Record]) -> Result<()> {
    let projects: Map<String, Value> = records
        .iter()
        .map(|r| (r.id.clone(), Value::Object(r.fields.clone())))
        .collect();
    let mut root = Map::new();
    root.insert(SNAPSHOT_COLLECTION.to_string(), Value::Object(projects));

    let json = serde_json::to_string_pretty(&Value::Object(root))?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    Ok(())
}
