//! Project record deduplication: title normalization, duplicate clustering,
//! field merging and the SQLite project store the CLI runs against.

pub mod changeset;
pub mod dedupe;
pub mod maintenance;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod safety;
pub mod scoring;
pub mod store;
