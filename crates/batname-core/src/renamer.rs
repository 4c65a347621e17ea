use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::{Catalog, CatalogRecord};
use crate::matcher::{MatchResult, Matcher};
use crate::naming;
use crate::NamingConfig;

/// Terminal state of one live file after the rename pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Renamed,
    RenamedXml,
    AlreadyRenamed,
    CannotMatch,
    NoDateInfo,
    FailedToRename,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Renamed => "renamed",
            Outcome::RenamedXml => "renamed xml",
            Outcome::AlreadyRenamed => "already renamed",
            Outcome::CannotMatch => "cannot match filename",
            Outcome::NoDateInfo => "no date info for renaming",
            Outcome::FailedToRename => "failed to rename",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Sidecar,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Sidecar => "xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub kind: FileKind,
    pub outcome: Outcome,
}

pub struct RenameSummary {
    /// One entry per live file, in enumeration order.
    pub outcomes: Vec<FileOutcome>,
}

impl RenameSummary {
    pub fn tally(&self) -> BTreeMap<Outcome, usize> {
        let mut counts = BTreeMap::new();
        for o in &self.outcomes {
            *counts.entry(o.outcome).or_insert(0) += 1;
        }
        counts
    }
}

/// Renames live files to the good names the catalog proposes.
pub struct Renamer<'a> {
    matcher: Matcher<'a>,
    config: &'a NamingConfig,
    dry_run: bool,
}

impl<'a> Renamer<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a NamingConfig, dry_run: bool) -> Self {
        Self {
            matcher: Matcher::new(catalog, config),
            config,
            dry_run,
        }
    }

    pub fn rename_audio(&self, path: &Path) -> Outcome {
        let filename = naming::file_name(path);
        if naming::is_already_renamed(&filename) {
            debug!("Already renamed: {}", path.display());
            return Outcome::AlreadyRenamed;
        }
        let Some(record) = self.unique(path, self.matcher.match_audio(&filename)) else {
            return Outcome::CannotMatch;
        };
        let Some(good) = record.good_name.as_deref() else {
            debug!("No date info for {}", path.display());
            return Outcome::NoDateInfo;
        };
        self.apply(path, &filename, good, Outcome::Renamed)
    }

    /// Sidecars are renamed on their own match, whatever happened to their audio file.
    pub fn rename_sidecar(&self, path: &Path) -> Outcome {
        let filename = naming::file_name(path);
        if naming::is_already_renamed(&filename) {
            debug!("Already renamed: {}", path.display());
            return Outcome::AlreadyRenamed;
        }
        let Some(record) = self.unique(path, self.matcher.match_sidecar(path)) else {
            return Outcome::CannotMatch;
        };
        let Some(good) = record.good_name.as_deref() else {
            debug!("No date info for {}", path.display());
            return Outcome::NoDateInfo;
        };
        let sidecar_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(&self.config.meta_ext);
        let dest_name = naming::sidecar_name(good, &self.config.audio_ext, sidecar_ext);
        self.apply(path, &filename, &dest_name, Outcome::RenamedXml)
    }

    fn unique<'r>(&self, path: &Path, result: MatchResult<'r>) -> Option<&'r CatalogRecord> {
        match result {
            MatchResult::Unique(record) => Some(record),
            MatchResult::NotFound => {
                warn!("Cannot match {}: no catalog record", path.display());
                None
            }
            MatchResult::Ambiguous(n) => {
                warn!("Cannot match {}: {} catalog records match", path.display(), n);
                None
            }
        }
    }

    fn apply(&self, path: &Path, filename: &str, dest_name: &str, success: Outcome) -> Outcome {
        if filename == dest_name {
            return Outcome::AlreadyRenamed;
        }
        let dest = path.with_file_name(dest_name);
        // fs::rename replaces an existing file on unix
        if dest.exists() {
            warn!(
                "Failed to rename {}: {} already exists",
                path.display(),
                dest.display()
            );
            return Outcome::FailedToRename;
        }
        if self.dry_run {
            debug!("Would rename {} -> {}", path.display(), dest_name);
            return success;
        }
        match fs::rename(path, &dest) {
            Ok(()) => {
                debug!("Renamed {} -> {}", path.display(), dest_name);
                success
            }
            Err(e) => {
                warn!("Failed to rename {}: {}", path.display(), e);
                Outcome::FailedToRename
            }
        }
    }
}

pub fn classify(path: &Path, config: &NamingConfig) -> Option<FileKind> {
    if naming::has_extension(path, &config.audio_ext) {
        Some(FileKind::Audio)
    } else if naming::has_extension(path, &config.meta_ext) {
        Some(FileKind::Sidecar)
    } else {
        None
    }
}

/// Audio files and sidecars below `root`, in file-name order per directory.
pub fn live_files(root: &Path, config: &NamingConfig) -> Vec<(PathBuf, FileKind)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if let Some(kind) = classify(entry.path(), config) {
                    files.push((entry.into_path(), kind));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Error accessing entry: {}", e),
        }
    }
    files
}
