use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::naming;
use crate::sidecar;
use crate::{NamingConfig, ThrottledProgress};

/// Everything inferred about one original audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub original_path: PathBuf,
    pub original_dir: PathBuf,
    pub original_filename: String,
    pub has_metadata: bool,
    #[serde(with = "crate::date::compact_opt")]
    pub derived_timestamp: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub good_name: Option<String>,
    pub bad_name: String,
    pub site_long: String,
    pub site_short: String,
}

impl CatalogRecord {
    /// Build the record for `path` found under the site folder `site_long`.
    pub fn from_audio(path: &Path, site_long: &str, config: &NamingConfig) -> Self {
        let data = sidecar::read_sidecar(path, config);
        let names = naming::propose(
            path,
            data.timestamp.as_ref(),
            data.position,
            site_long,
            config,
        );
        Self {
            original_path: path.to_path_buf(),
            original_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            original_filename: naming::file_name(path),
            has_metadata: data.has_metadata,
            derived_timestamp: data.timestamp,
            latitude: data.position.map(|(lat, _)| lat),
            longitude: data.position.map(|(_, lon)| lon),
            good_name: names.good_name,
            bad_name: names.bad_name,
            site_long: site_long.to_string(),
            site_short: short_label(site_long),
        }
    }

    /// `original_path` with `/` separators, for path-suffix matching.
    pub fn normalized_path(&self) -> String {
        self.original_path.to_string_lossy().replace('\\', "/")
    }
}

/// Read-only table of records, one per original audio file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<CatalogRecord>,
}

impl Catalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persist as CSV; the hand-off between the scan and the later phases.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("cannot create catalog {}", path.display()))?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("cannot open catalog {}", path.display()))?;
        let records = rdr
            .deserialize()
            .collect::<Result<Vec<CatalogRecord>, _>>()
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        Ok(Self { records })
    }
}

/// Metadata coverage of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSummary {
    pub site: String,
    pub files: usize,
    /// Files whose sidecar gave a timestamp, i.e. that can be renamed.
    pub usable: usize,
}

impl SiteSummary {
    pub fn fraction(&self) -> f64 {
        if self.files == 0 {
            0.0
        } else {
            self.usable as f64 / self.files as f64
        }
    }
}

pub struct BuildResult {
    pub catalog: Catalog,
    pub sites: Vec<SiteSummary>,
    /// Site folders without a single audio file.
    pub skipped_sites: Vec<String>,
}

/// Scan every site folder under `root` and infer names for each audio file.
pub fn build(
    root: &Path,
    config: &NamingConfig,
    progress: &ThrottledProgress,
) -> anyhow::Result<BuildResult> {
    let sites = list_sites(root)?;

    let mut work: Vec<(String, Vec<PathBuf>)> = Vec::with_capacity(sites.len());
    let mut skipped_sites = Vec::new();
    for site in &sites {
        let label = naming::file_name(site);
        let files = audio_files(site, config);
        if files.is_empty() {
            warn!("Skipping site {}: no .{} files", label, config.audio_ext);
            skipped_sites.push(label);
            continue;
        }
        work.push((label, files));
    }

    let total: u64 = work.iter().map(|(_, files)| files.len() as u64).sum();
    let mut current = 0u64;
    let mut records = Vec::with_capacity(total as usize);
    let mut summaries = Vec::with_capacity(work.len());

    for (label, files) in work {
        let mut usable = 0;
        for path in &files {
            let record = CatalogRecord::from_audio(path, &label, config);
            if record.good_name.is_some() {
                usable += 1;
            }
            debug!("{} -> {:?}", record.bad_name, record.good_name);
            records.push(record);
            progress.report("catalog", current, total, &label);
            current += 1;
        }
        summaries.push(SiteSummary {
            site: label,
            files: files.len(),
            usable,
        });
    }

    Ok(BuildResult {
        catalog: Catalog::new(records),
        sites: summaries,
        skipped_sites,
    })
}

/// Immediate subdirectories of `root`, sorted by name.
pub fn list_sites(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let root = fs::canonicalize(root)
        .with_context(|| format!("cannot read root folder {}", root.display()))?;
    let mut sites = Vec::new();
    for entry in fs::read_dir(&root)
        .with_context(|| format!("cannot read root folder {}", root.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            sites.push(path);
        }
    }
    if sites.is_empty() {
        anyhow::bail!("{} holds no site folders", root.display());
    }
    sites.sort();
    Ok(sites)
}

/// All audio files below `dir`, in file-name order per directory.
pub fn audio_files(dir: &Path, config: &NamingConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && naming::has_extension(entry.path(), &config.audio_ext) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Error accessing entry: {}", e),
        }
    }
    files
}

/// First word of a site folder name, split on whitespace or `_`.
pub fn short_label(site_long: &str) -> String {
    site_long
        .split(|c: char| c.is_whitespace() || c == '_')
        .find(|s| !s.is_empty())
        .unwrap_or(site_long)
        .to_string()
}
