//! Two-pass duplicate clustering over a full snapshot of projects.
//!
//! ## Passes
//!
//! 1. **Exact key**: records are grouped by normalized title in input
//!    order. The first record for a key founds the cluster and later ones are
//!    folded into it.
//! 2. **Similarity**: the keys left after pass 1 are compared pairwise and
//!    pairs scoring strictly above the threshold are merged, the less
//!    complete canonical folding into the more complete one.
//!
//! Clusters live in one `Vec` for the whole run. Pass 2 flags absorbed
//! indices instead of removing them and compacts once at the end, so a
//! cluster is never visited after it has been folded away.
//!
//! The engine does no I/O besides the optional progress bar; fetching and
//! applying are the store's job.

use rustc_hash::FxHashSet;
use std::time::Instant;

use crate::models::{Cluster, KeyIndex, MergeStats, Record};
use crate::normalize::{normalize_title_with, NumberStyle};
use crate::progress::{create_progress_bar, log_progress};
use crate::scoring::{completeness, exceeds_threshold, similarity, SIMILARITY_THRESHOLD};

// ============================================================================
// Configuration
// ============================================================================

/// How pass 2 groups similar keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SimilarityStrategy {
    /// One merge per row: after the first match for `i`, move on to `i + 1`.
    /// Not transitive; three mutually similar titles can end up as two.
    Greedy,
    /// Union-find over every pair above the threshold, then fold each
    /// connected component into its most complete member.
    #[default]
    Components,
}

/// What happens to records whose title is blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UntitledPolicy {
    /// Leave them out of the changeset entirely (they stay untouched in the store).
    #[default]
    Drop,
    /// Keep each one as a survivor of itself.
    Retain,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub threshold: f64,
    pub strategy: SimilarityStrategy,
    pub numbers: NumberStyle,
    pub untitled: UntitledPolicy,
    /// Show a progress bar during pass 2
    pub progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: SIMILARITY_THRESHOLD,
            strategy: SimilarityStrategy::default(),
            numbers: NumberStyle::default(),
            untitled: UntitledPolicy::default(),
            progress: false,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// One fold of a record (or cluster) into a canonical, for reporting.
#[derive(Debug, Clone)]
pub struct MergeEvent {
    pub pass: u8,
    pub kept_id: String,
    pub kept_title: String,
    pub absorbed_id: String,
    pub absorbed_title: String,
    /// Key similarity; None for exact key matches
    pub score: Option<f64>,
    pub filled: Vec<String>,
}

impl std::fmt::Display for MergeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Merged \"{}\" ({}) into \"{}\" ({})",
            self.absorbed_title, self.absorbed_id, self.kept_title, self.kept_id
        )?;
        match self.score {
            Some(score) => write!(f, " (similarity: {:.2})", score)?,
            None => write!(f, " (same title)")?,
        }
        if !self.filled.is_empty() {
            write!(f, ", filled: {}", self.filled.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub clusters: Vec<Cluster>,
    /// Ids of blank-title records left out under `UntitledPolicy::Drop`
    pub dropped: Vec<String>,
    pub events: Vec<MergeEvent>,
    pub stats: MergeStats,
}

impl DedupeOutcome {
    /// Ids the changeset has to account for: the ids that went into the run,
    /// minus the untitled ones that were dropped.
    pub fn expected_ids<'a>(&self, input_ids: &'a [String]) -> Vec<&'a str> {
        let dropped: FxHashSet<&str> = self.dropped.iter().map(String::as_str).collect();
        input_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !dropped.contains(id))
            .collect()
    }
}

// ============================================================================
// Union-Find
// ============================================================================

fn find(parent: &mut [usize], i: usize) -> usize {
    if parent[i] != i {
        parent[i] = find(parent, parent[i]);
    }
    parent[i]
}

/// Join two sets, keeping the smaller index as root.
fn union(parent: &mut [usize], i: usize, j: usize) {
    let pi = find(parent, i);
    let pj = find(parent, j);
    if pi != pj {
        parent[pi.max(pj)] = pi.min(pj);
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct DedupeEngine {
    config: EngineConfig,
}

impl DedupeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run both passes over a full snapshot.
    pub fn run(&self, records: Vec<Record>) -> DedupeOutcome {
        let start = Instant::now();
        let mut outcome = DedupeOutcome::default();

        let clusters = self.group_exact(records, &mut outcome);
        outcome.stats.clusters_after_exact = clusters.len();

        let clusters = match self.config.strategy {
            SimilarityStrategy::Greedy => self.merge_greedy(clusters, &mut outcome),
            SimilarityStrategy::Components => self.merge_components(clusters, &mut outcome),
        };

        outcome.stats.survivors = clusters.len();
        outcome.stats.deletions = clusters.iter().map(|c| c.absorbed.len()).sum();
        outcome.stats.elapsed_seconds = start.elapsed().as_secs_f64();
        outcome.clusters = clusters;
        outcome
    }

    /// Pass 1: group by exact normalized key, first seen wins.
    fn group_exact(&self, records: Vec<Record>, outcome: &mut DedupeOutcome) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut index = KeyIndex::default();

        for record in records {
            outcome.stats.records += 1;

            if record.title().trim().is_empty() {
                outcome.stats.untitled += 1;
                match self.config.untitled {
                    UntitledPolicy::Drop => outcome.dropped.push(record.id),
                    UntitledPolicy::Retain => clusters.push(Cluster::unclusterable(record)),
                }
                continue;
            }

            let key = normalize_title_with(record.title(), self.config.numbers);
            if key.is_empty() {
                outcome.stats.unclusterable += 1;
                clusters.push(Cluster::unclusterable(record));
                continue;
            }

            match index.get(&key).copied() {
                Some(idx) => {
                    let cluster = &mut clusters[idx];
                    let kept_id = cluster.canonical.id.clone();
                    let kept_title = cluster.canonical.title().to_string();
                    let absorbed_id = record.id.clone();
                    let absorbed_title = record.title().to_string();
                    let filled = cluster.absorb(record);

                    outcome.stats.exact_merges += 1;
                    outcome.events.push(MergeEvent {
                        pass: 1,
                        kept_id,
                        kept_title,
                        absorbed_id,
                        absorbed_title,
                        score: None,
                        filled,
                    });
                }
                None => {
                    index.insert(key.clone(), clusters.len());
                    clusters.push(Cluster::new(key, record));
                }
            }
        }

        clusters
    }

    /// Indices of clusters that take part in pass 2, in creation order.
    fn candidates(clusters: &[Cluster]) -> Vec<usize> {
        clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.clusterable)
            .map(|(i, _)| i)
            .collect()
    }

    /// Strings pass 2 compares, one per cluster: each key normalized once
    /// more. Under `NumberStyle::Swap` this flips number spellings back, so
    /// "racer four" is scored as "racer 4".
    fn scoring_keys(&self, clusters: &[Cluster]) -> Vec<String> {
        clusters
            .iter()
            .map(|c| normalize_title_with(&c.key, self.config.numbers))
            .collect()
    }

    /// Fold `loser` into `winner` and flag it.
    fn fold(
        clusters: &mut [Cluster],
        absorbed: &mut [bool],
        winner: usize,
        loser: usize,
        score: f64,
        outcome: &mut DedupeOutcome,
    ) {
        let taken = std::mem::take(&mut clusters[loser]);
        absorbed[loser] = true;

        let absorbed_id = taken.canonical.id.clone();
        let absorbed_title = taken.canonical.title().to_string();
        let target = &mut clusters[winner];
        let filled = target.absorb_cluster(taken);

        outcome.stats.similar_merges += 1;
        outcome.events.push(MergeEvent {
            pass: 2,
            kept_id: target.canonical.id.clone(),
            kept_title: target.canonical.title().to_string(),
            absorbed_id,
            absorbed_title,
            score: Some(score),
            filled,
        });
    }

    fn compact(clusters: Vec<Cluster>, absorbed: &[bool]) -> Vec<Cluster> {
        clusters
            .into_iter()
            .zip(absorbed)
            .filter(|(_, gone)| !**gone)
            .map(|(c, _)| c)
            .collect()
    }

    /// Pass 2, greedy: first match per row, no re-scan.
    fn merge_greedy(&self, mut clusters: Vec<Cluster>, outcome: &mut DedupeOutcome) -> Vec<Cluster> {
        let candidates = Self::candidates(&clusters);
        let keys = self.scoring_keys(&clusters);
        let mut absorbed = vec![false; clusters.len()];
        let pb = self.progress_bar(candidates.len());

        for (pos, &i) in candidates.iter().enumerate() {
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            log_progress("pass 2", pos as u64 + 1, candidates.len() as u64, 1_000);

            if absorbed[i] {
                continue;
            }
            for &j in &candidates[pos + 1..] {
                if absorbed[j] {
                    continue;
                }
                outcome.stats.comparisons += 1;
                let score = similarity(&keys[i], &keys[j]);
                if !exceeds_threshold(score, self.config.threshold) {
                    continue;
                }

                let (winner, loser) =
                    if completeness(&clusters[i].canonical) >= completeness(&clusters[j].canonical) {
                        (i, j)
                    } else {
                        (j, i)
                    };
                Self::fold(&mut clusters, &mut absorbed, winner, loser, score, outcome);
                break;
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message(format!("Pass 2: {} similar merges", outcome.stats.similar_merges));
        }
        Self::compact(clusters, &absorbed)
    }

    /// Pass 2, components: transitive closure over the similarity graph.
    fn merge_components(
        &self,
        mut clusters: Vec<Cluster>,
        outcome: &mut DedupeOutcome,
    ) -> Vec<Cluster> {
        let candidates = Self::candidates(&clusters);
        let keys = self.scoring_keys(&clusters);
        let n = candidates.len();
        let mut parent: Vec<usize> = (0..n).collect();
        let pb = self.progress_bar(n);

        for a in 0..n {
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            log_progress("pass 2", a as u64 + 1, n as u64, 1_000);

            for b in (a + 1)..n {
                outcome.stats.comparisons += 1;
                let score = similarity(&keys[candidates[a]], &keys[candidates[b]]);
                if exceeds_threshold(score, self.config.threshold) {
                    union(&mut parent, a, b);
                }
            }
        }

        // Members per root, in candidate order
        let mut components: Vec<Vec<usize>> = vec![Vec::new(); n];
        for pos in 0..n {
            let root = find(&mut parent, pos);
            components[root].push(candidates[pos]);
        }

        let mut absorbed = vec![false; clusters.len()];
        for members in components.into_iter().filter(|m| m.len() > 1) {
            outcome.stats.components += 1;

            // Most complete first, earliest index on ties
            let mut ranked: Vec<(usize, usize)> = members
                .iter()
                .map(|&idx| (completeness(&clusters[idx].canonical), idx))
                .collect();
            ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let winner = ranked[0].1;
            for &(_, loser) in &ranked[1..] {
                let score = similarity(&keys[winner], &keys[loser]);
                Self::fold(&mut clusters, &mut absorbed, winner, loser, score, outcome);
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message(format!(
                "Pass 2: {} similar merges in {} groups",
                outcome.stats.similar_merges, outcome.stats.components
            ));
        }
        Self::compact(clusters, &absorbed)
    }

    fn progress_bar(&self, len: usize) -> Option<indicatif::ProgressBar> {
        self.config
            .progress
            .then(|| create_progress_bar(len as u64, "Pass 2: Comparing titles"))
    }
}
