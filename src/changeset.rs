//! Turns final clusters into the upserts and deletions applied to the store.

use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::models::{Changeset, Cluster};

/// Field stamped on every surviving project
pub const UPDATED_AT: &str = "updated_at";

pub struct ChangesetBuilder {
    stamp: DateTime<Utc>,
}

impl Default for ChangesetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangesetBuilder {
    /// Builder stamping survivors with the current time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(stamp: DateTime<Utc>) -> Self {
        Self { stamp }
    }

    /// Dissolve clusters into a changeset.
    ///
    /// Fails when any id would be both kept and deleted, or would show up
    /// twice on either side. Nothing is partially built in that case.
    pub fn build(&self, clusters: Vec<Cluster>) -> Result<Changeset> {
        let stamp = Value::String(self.stamp.to_rfc3339_opts(SecondsFormat::Secs, true));
        let mut changeset = Changeset::default();

        for cluster in clusters {
            for id in cluster.absorbed {
                if !changeset.deletions.insert(id.clone()) {
                    bail!("Project '{}' was absorbed more than once", id);
                }
            }

            let mut canonical = cluster.canonical;
            canonical.fields.insert(UPDATED_AT.to_string(), stamp.clone());
            let id = canonical.id.clone();
            if changeset.upserts.insert(id.clone(), canonical).is_some() {
                bail!("Project '{}' survives in more than one cluster", id);
            }
        }

        if let Some(id) = changeset
            .deletions
            .iter()
            .find(|id| changeset.upserts.contains_key(*id))
        {
            bail!("Project '{}' is both kept and deleted", id);
        }

        Ok(changeset)
    }
}
