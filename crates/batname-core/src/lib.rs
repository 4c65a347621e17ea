pub mod catalog;
pub mod date;
pub mod matcher;
pub mod naming;
pub mod reconcile;
pub mod renamer;
pub mod report;
pub mod sidecar;

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use catalog::{BuildResult, Catalog, CatalogRecord, SiteSummary};
pub use matcher::{MatchResult, Matcher};
pub use reconcile::{TableOutcome, TableStatus};
pub use renamer::{FileKind, FileOutcome, Outcome, RenameSummary, Renamer};

fn default_audio_ext() -> String {
    "wav".to_string()
}

fn default_meta_ext() -> String {
    "xml".to_string()
}

fn default_marker() -> String {
    "Location".to_string()
}

fn default_timestamp_tag() -> String {
    "DateTime".to_string()
}

fn default_position_tag() -> String {
    "Position".to_string()
}

/// Naming conventions shared by every phase.
///
/// Loaded from JSON with `NamingConfig::load`; any field left out takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Audio extension without the dot, compared case-insensitively.
    #[serde(default = "default_audio_ext")]
    pub audio_ext: String,
    /// Sidecar extension without the dot, compared case-insensitively.
    #[serde(default = "default_meta_ext")]
    pub meta_ext: String,
    /// Segment of a bad name that survived the old renaming tool unchanged.
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_timestamp_tag")]
    pub timestamp_tag: String,
    #[serde(default = "default_position_tag")]
    pub position_tag: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            audio_ext: default_audio_ext(),
            meta_ext: default_meta_ext(),
            marker: default_marker(),
            timestamp_tag: default_timestamp_tag(),
            position_tag: default_position_tag(),
        }
    }
}

impl NamingConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: NamingConfig = serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if config.audio_ext.is_empty() || config.meta_ext.is_empty() {
            anyhow::bail!("config {}: extensions must not be empty", path.display());
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Live tree holding the badly-named files.
    pub root: PathBuf,
    /// Compute outcomes without touching the filesystem.
    #[serde(default)]
    pub dry_run: bool,
}

/// Type alias for progress callback: (stage, current, total, message)
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + 'a;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Cell<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Cell::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if self.last_emit.get().elapsed().as_millis() < 200 {
                return;
            }
            self.last_emit.set(Instant::now());
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Scan `root` and build the catalog of proposed names.
pub fn build_catalog(
    root: &Path,
    config: &NamingConfig,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<BuildResult> {
    let tp = ThrottledProgress::new(progress_callback);
    let result = catalog::build(root, config, &tp)?;

    for site in &result.sites {
        info!(
            "{}: {}/{} files with usable metadata ({:.1}%)",
            site.site,
            site.usable,
            site.files,
            site.fraction() * 100.0
        );
    }
    info!(
        "Catalog holds {} records from {} sites",
        result.catalog.len(),
        result.sites.len()
    );
    Ok(result)
}

/// Rename every audio file and sidecar under `options.root` that the catalog can place.
pub fn rename_tree(
    options: &RenameOptions,
    catalog: &Catalog,
    config: &NamingConfig,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<RenameSummary> {
    let tp = ThrottledProgress::new(progress_callback);
    if !options.root.is_dir() {
        anyhow::bail!("{} is not a readable directory", options.root.display());
    }

    let files = renamer::live_files(&options.root, config);
    let audio_count = files.iter().filter(|(_, k)| *k == FileKind::Audio).count();
    if audio_count != catalog.len() {
        warn!(
            "Found {} audio files on disk but the catalog has {} records",
            audio_count,
            catalog.len()
        );
    }

    let renamer = Renamer::new(catalog, config, options.dry_run);
    let total = files.len() as u64;
    let mut outcomes = Vec::with_capacity(files.len());
    for (i, (path, kind)) in files.into_iter().enumerate() {
        let outcome = match kind {
            FileKind::Audio => renamer.rename_audio(&path),
            FileKind::Sidecar => renamer.rename_sidecar(&path),
        };
        tp.report("rename", i as u64, total, outcome.as_str());
        outcomes.push(FileOutcome { path, kind, outcome });
    }

    let summary = RenameSummary { outcomes };
    for (outcome, count) in summary.tally() {
        info!("{}: {}", outcome, count);
    }
    Ok(summary)
}

/// Rewrite filenames and date fields of every results table, one table at a time.
pub fn fix_tables(
    tables: &[PathBuf],
    catalog: &Catalog,
    config: &NamingConfig,
    progress_callback: &ProgressCallback,
) -> Vec<TableOutcome> {
    let tp = ThrottledProgress::new(progress_callback);
    let matcher = Matcher::new(catalog, config);
    let total = tables.len() as u64;
    tables
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let outcome = reconcile::fix_table(path, &matcher)
                .unwrap_or_else(|e| TableOutcome::failed(path, &e));
            log_table(&outcome, "fixed");
            tp.report("fix-csv", i as u64, total, &outcome.path.display().to_string());
            outcome
        })
        .collect()
}

/// Re-derive date and time fields from the filenames already in each table.
pub fn retrofit_tables(
    tables: &[PathBuf],
    progress_callback: &ProgressCallback,
) -> Vec<TableOutcome> {
    let tp = ThrottledProgress::new(progress_callback);
    let total = tables.len() as u64;
    tables
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let outcome = reconcile::retrofit_table(path)
                .unwrap_or_else(|e| TableOutcome::failed(path, &e));
            log_table(&outcome, "changed");
            tp.report("retrofit-csv", i as u64, total, &outcome.path.display().to_string());
            outcome
        })
        .collect()
}

fn log_table(outcome: &TableOutcome, verb: &str) {
    match &outcome.status {
        TableStatus::Ok => info!(
            "{}: {}/{} rows {} ({:.1}%)",
            outcome.path.display(),
            outcome.changed,
            outcome.rows,
            verb,
            outcome.percent()
        ),
        TableStatus::Failed(reason) => warn!("{}: {}", outcome.path.display(), reason),
    }
}
