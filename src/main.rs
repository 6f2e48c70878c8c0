//! # project-dedupe
//!
//! Finds portfolio projects that were entered more than once under slightly
//! different titles, folds each group into its most complete record and
//! deletes the rest. Also carries the small maintenance commands used to
//! keep the project collection tidy.
//!
//! ```bash
//! # Load a snapshot, preview the merge, then apply it
//! project-dedupe projects.sqlite3 import projects.json --replace
//! project-dedupe projects.sqlite3 merge --dry-run
//! project-dedupe projects.sqlite3 merge --stats merge-stats.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

use project_dedupe::changeset::{ChangesetBuilder, UPDATED_AT};
use project_dedupe::dedupe::{
    DedupeEngine, DedupeOutcome, EngineConfig, SimilarityStrategy, UntitledPolicy,
};
use project_dedupe::maintenance::{coerce_technologies, field_coverage, slug_updates};
use project_dedupe::models::Fields;
use project_dedupe::normalize::{normalize_title_with, NumberStyle};
use project_dedupe::progress::{create_spinner, format_duration, set_log_only};
use project_dedupe::safety::validate_export_path;
use project_dedupe::scoring::SIMILARITY_THRESHOLD;
use project_dedupe::store::ProjectStore;

#[derive(Parser)]
#[command(name = "project-dedupe")]
#[command(about = "Merge duplicate portfolio projects and maintain the project store")]
struct Cli {
    /// Project store (SQLite database, created if missing)
    db: PathBuf,

    /// Hide progress bars and print periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find duplicate projects, merge them and delete the extras.
    Merge {
        /// Print what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Titles must score strictly above this to count as duplicates
        #[arg(long, default_value_t = SIMILARITY_THRESHOLD)]
        threshold: f64,

        /// How similar titles are grouped in the second pass
        #[arg(long, value_enum, default_value_t = SimilarityStrategy::Components)]
        strategy: SimilarityStrategy,

        /// How numbers in titles are normalized
        #[arg(long, value_enum, default_value_t = NumberStyle::Swap)]
        numbers: NumberStyle,

        /// Keep untitled projects as survivors (stamped and rewritten)
        #[arg(long)]
        keep_untitled: bool,

        /// Write run statistics to this JSON file
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Report how many projects carry and fill each field.
    Analyze,

    /// Load a JSON snapshot into the store.
    Import {
        input: PathBuf,

        /// Remove every existing project first
        #[arg(long)]
        replace: bool,
    },

    /// Write every project to a JSON snapshot.
    Export { output: PathBuf },

    /// Fill in missing slugs from project titles.
    Slugs,

    /// Turn non-list `technologies` values into lists.
    FixTechnologies,

    /// Delete every project with the given slug.
    Delete { slug: String },

    /// Print the normalized title key of every project.
    Keys {
        #[arg(long, value_enum, default_value_t = NumberStyle::Swap)]
        numbers: NumberStyle,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    set_log_only(cli.log_only);

    let start = Instant::now();
    println!("Opening project store: {:?}", cli.db);
    let mut store = ProjectStore::open(&cli.db)?;

    match cli.command {
        Commands::Merge {
            dry_run,
            threshold,
            strategy,
            numbers,
            keep_untitled,
            stats,
        } => {
            let config = EngineConfig {
                threshold,
                strategy,
                numbers,
                untitled: if keep_untitled {
                    UntitledPolicy::Retain
                } else {
                    UntitledPolicy::Drop
                },
                progress: true,
            };
            run_merge(&mut store, config, dry_run, stats.as_deref())?;
        }
        Commands::Analyze => run_analyze(&store)?,
        Commands::Import { input, replace } => {
            let n = store
                .import_json(&input, replace)
                .with_context(|| format!("Failed to import {}", input.display()))?;
            println!("Imported {} projects{}", n, if replace { " (replaced)" } else { "" });
            println!("Store now holds {} projects", store.count()?);
        }
        Commands::Export { output } => {
            validate_export_path(&output, &cli.db)?;
            let n = store.export_json(&output)?;
            println!("Exported {} projects to {:?}", n, output);
        }
        Commands::Slugs => run_slugs(&store)?,
        Commands::FixTechnologies => run_fix_technologies(&store)?,
        Commands::Delete { slug } => {
            let n = store.delete_by_slug(&slug)?;
            if n == 0 {
                println!("No project found with slug '{}'", slug);
            } else {
                println!("Deleted {} project(s) with slug '{}'", n, slug);
            }
        }
        Commands::Keys { numbers } => {
            for record in store.fetch_all()? {
                println!(
                    "{}\t{}\t{}",
                    record.id,
                    normalize_title_with(record.title(), numbers),
                    record.title()
                );
            }
        }
    }

    println!("Done in {}", format_duration(start.elapsed()));
    Ok(())
}

fn run_merge(
    store: &mut ProjectStore,
    config: EngineConfig,
    dry_run: bool,
    stats_path: Option<&Path>,
) -> Result<()> {
    let spinner = create_spinner("Reading projects");
    let records = store.fetch_all().context("Failed to read projects")?;
    spinner.finish_and_clear();
    println!("Read {} projects", records.len());

    let input_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    let titles: FxHashMap<String, String> = records
        .iter()
        .map(|r| (r.id.clone(), r.title().to_string()))
        .collect();

    println!(
        "Merging (strategy: {:?}, threshold: {}, numbers: {:?})",
        config.strategy, config.threshold, config.numbers
    );
    let outcome = DedupeEngine::new(config).run(records);
    outcome.stats.log_phase("merge");
    if let Some(path) = stats_path {
        outcome
            .stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    for event in &outcome.events {
        println!("Pass {}: {}", event.pass, event);
    }
    print_plan(&outcome, &titles);

    let expected = outcome.expected_ids(&input_ids);
    let changeset = ChangesetBuilder::new().build(outcome.clusters)?;
    changeset.verify_accounts(expected)?;

    if !changeset.has_merges() {
        println!("No changes needed");
        return Ok(());
    }
    if dry_run {
        println!(
            "Dry run: would update {} and delete {} projects",
            changeset.upserts.len(),
            changeset.deletions.len()
        );
        return Ok(());
    }

    let spinner = create_spinner("Applying changes");
    store
        .apply_changeset(&changeset)
        .context("Failed to apply merge; the store was left unchanged")?;
    spinner.finish_and_clear();

    println!("\n{:=<60}", "");
    println!("Merge complete!");
    println!("  Projects kept: {}", changeset.upserts.len());
    println!("  Projects deleted: {}", changeset.deletions.len());
    println!("  Duplicate rate: {:.1}%", outcome.stats.duplicate_rate());
    println!("{:=<60}", "");
    Ok(())
}

fn print_plan(outcome: &DedupeOutcome, titles: &FxHashMap<String, String>) {
    let title_of = |id: &str| titles.get(id).map(String::as_str).unwrap_or("");

    for cluster in outcome.clusters.iter().filter(|c| !c.absorbed.is_empty()) {
        println!(
            "Keep {} \"{}\" ({} records)",
            cluster.canonical.id,
            title_of(&cluster.canonical.id),
            cluster.size()
        );
        for id in &cluster.absorbed {
            println!("  delete {} \"{}\"", id, title_of(id));
        }
    }

    if !outcome.dropped.is_empty() {
        eprintln!("Skipped {} untitled projects", outcome.dropped.len());
    }
}

fn run_analyze(store: &ProjectStore) -> Result<()> {
    let records = store.fetch_all()?;
    println!("Total projects: {}", records.len());

    for c in field_coverage(&records) {
        println!(
            "  {:<24} {:>6} present {:>6} filled ({:.1}%)",
            c.field,
            c.present,
            c.filled,
            c.filled_rate(records.len())
        );
    }
    Ok(())
}

fn run_slugs(store: &ProjectStore) -> Result<()> {
    let updates = slug_updates(&store.fetch_all()?);
    let stamp = Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));

    for (id, slug) in &updates {
        let mut fields = Fields::new();
        fields.insert("slug".to_string(), Value::String(slug.clone()));
        fields.insert(UPDATED_AT.to_string(), stamp.clone());
        store.update_fields(id, fields)?;
        println!("  {} -> {}", id, slug);
    }
    println!("Updated {} slugs", updates.len());
    Ok(())
}

fn run_fix_technologies(store: &ProjectStore) -> Result<()> {
    let mut fixed = 0;
    for record in store.fetch_all()? {
        if let Some(value) = coerce_technologies(record.get("technologies")) {
            println!("  {}: {}", record.id, value);
            let mut fields = Fields::new();
            fields.insert("technologies".to_string(), value);
            store.update_fields(&record.id, fields)?;
            fixed += 1;
        }
    }
    println!("Fixed {} projects", fixed);
    Ok(())
}
