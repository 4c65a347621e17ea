use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;

use crate::catalog::{Catalog, CatalogRecord};
use crate::naming;
use crate::NamingConfig;

/// Result of looking a live file up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult<'a> {
    Unique(&'a CatalogRecord),
    NotFound,
    /// More than one distinct record matched.
    Ambiguous(usize),
}

impl<'a> MatchResult<'a> {
    fn from_ids(catalog: &'a Catalog, mut ids: Vec<usize>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        match ids.as_slice() {
            [] => MatchResult::NotFound,
            [id] => MatchResult::Unique(&catalog.records()[*id]),
            _ => MatchResult::Ambiguous(ids.len()),
        }
    }

    pub fn unique(self) -> Option<&'a CatalogRecord> {
        match self {
            MatchResult::Unique(record) => Some(record),
            _ => None,
        }
    }
}

/// Indexed lookups over a borrowed catalog.
///
/// The indices narrow the candidates; every lookup keeps plain substring
/// semantics, so two records sharing a key always come back as ambiguous.
pub struct Matcher<'a> {
    catalog: &'a Catalog,
    config: &'a NamingConfig,
    /// Every suffix of a bad name that starts at the marker -> record ids
    by_marker_suffix: BTreeMap<&'a str, Vec<usize>>,
    /// original filename, extension lowercased -> record ids
    by_filename: BTreeMap<String, Vec<usize>>,
    /// bad name stripped to the marker -> record ids
    by_key: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a NamingConfig) -> Self {
        let mut by_marker_suffix: BTreeMap<&'a str, Vec<usize>> = BTreeMap::new();
        let mut by_filename: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_key: HashMap<&'a str, Vec<usize>> = HashMap::new();

        for (id, record) in catalog.records().iter().enumerate() {
            let bad = record.bad_name.as_str();
            if !config.marker.is_empty() {
                // overlapping occurrences count too
                for (pos, _) in bad.char_indices() {
                    if bad[pos..].starts_with(config.marker.as_str()) {
                        by_marker_suffix.entry(&bad[pos..]).or_default().push(id);
                    }
                }
            }
            by_filename
                .entry(naming::fold_extension(&record.original_filename))
                .or_default()
                .push(id);
            by_key
                .entry(naming::strip_to_marker(bad, &config.marker))
                .or_default()
                .push(id);
        }

        Self {
            catalog,
            config,
            by_marker_suffix,
            by_filename,
            by_key,
        }
    }

    /// Records whose bad name contains the marker-stripped `filename`.
    pub fn match_audio(&self, filename: &str) -> MatchResult<'a> {
        let needle = naming::strip_to_marker(filename.trim(), &self.config.marker);
        let ids = if !self.config.marker.is_empty() && needle.starts_with(self.config.marker.as_str()) {
            // any occurrence of `needle` starts at a marker, so it prefixes an indexed suffix
            prefixed(&self.by_marker_suffix, needle)
        } else {
            self.scan(|r| r.bad_name.contains(needle))
        };
        MatchResult::from_ids(self.catalog, ids)
    }

    /// Records whose original path contains `{parent}/{paired audio filename}`.
    ///
    /// Plain filenames repeat across nights and sites, so the parent folder is
    /// part of the key. Extensions compare without case.
    pub fn match_sidecar(&self, sidecar: &Path) -> MatchResult<'a> {
        let filename = naming::file_name(sidecar);
        let parent = sidecar
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let paired = naming::fold_extension(&self.paired_audio_name(&filename));
        let query = format!("{}/{}", parent, paired);

        let ids = prefixed(&self.by_filename, &paired)
            .into_iter()
            .filter(|&id| {
                let path = self.catalog.records()[id].normalized_path();
                naming::fold_extension(&path).contains(&query)
            })
            .collect();
        MatchResult::from_ids(self.catalog, ids)
    }

    /// Records whose marker-stripped bad name equals the marker-stripped `name`.
    pub fn match_exact(&self, name: &str) -> MatchResult<'a> {
        let key = naming::strip_to_marker(name.trim(), &self.config.marker);
        let ids = self.by_key.get(key).cloned().unwrap_or_default();
        MatchResult::from_ids(self.catalog, ids)
    }

    /// Audio filename a sidecar pairs with, stripped to the marker.
    pub fn paired_audio_name(&self, sidecar_filename: &str) -> String {
        let stripped = naming::strip_to_marker(sidecar_filename.trim(), &self.config.marker);
        naming::swap_extension(stripped, &self.config.meta_ext, &self.config.audio_ext)
    }

    fn scan(&self, pred: impl Fn(&CatalogRecord) -> bool) -> Vec<usize> {
        self.catalog
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| pred(r))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Ids stored under every key starting with `prefix`.
fn prefixed<K: Borrow<str> + Ord>(index: &BTreeMap<K, Vec<usize>>, prefix: &str) -> Vec<usize> {
    index
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(key, _)| Borrow::<str>::borrow(*key).starts_with(prefix))
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect()
}
