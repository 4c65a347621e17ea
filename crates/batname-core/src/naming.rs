use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::date;
use crate::NamingConfig;

/// A coordinate label with `~` separator followed by `+`: the start of a canonical name.
static ALREADY_RENAMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+~\d+\+").unwrap());

/// Both names proposed for one audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedNames {
    pub good_name: Option<String>,
    pub bad_name: String,
}

/// Propose names for the audio file at `path` inside the site labelled `site_label`.
pub fn propose(
    path: &Path,
    timestamp: Option<&NaiveDateTime>,
    position: Option<(f64, f64)>,
    site_label: &str,
    config: &NamingConfig,
) -> ProposedNames {
    let original_filename = file_name(path);
    let parent_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");

    ProposedNames {
        good_name: good_name(timestamp, position, &original_filename, &config.audio_ext),
        bad_name: bad_name(site_label, parent_dir, &original_filename),
    }
}

/// Canonical filename, `None` without a timestamp.
pub fn good_name(
    timestamp: Option<&NaiveDateTime>,
    position: Option<(f64, f64)>,
    original_filename: &str,
    audio_ext: &str,
) -> Option<String> {
    let ts = date::to_compact(timestamp?);
    let name = match position {
        Some((lat, lon)) => format!(
            "{}+{}_{}.{}",
            coordinate_label(lat),
            coordinate_label(lon),
            ts,
            audio_ext
        ),
        None => format!("{}_{}", ts, original_filename),
    };
    Some(name.trim().to_string())
}

/// Fixed-point coordinate with `~` in place of `.`; the downstream viewer rejects dots.
pub fn coordinate_label(value: f64) -> String {
    format!("{:.4}", value).replace('.', "~")
}

/// The name the old tool produced by gluing path segments together.
pub fn bad_name(site_label: &str, parent_dir: &str, original_filename: &str) -> String {
    format!("{}_{}_{}", site_label, parent_dir, original_filename)
        .trim()
        .to_string()
}

/// Drop everything before the first occurrence of `marker`.
pub fn strip_to_marker<'a>(name: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return name;
    }
    match name.find(marker) {
        Some(pos) => &name[pos..],
        None => name,
    }
}

pub fn is_already_renamed(filename: &str) -> bool {
    ALREADY_RENAMED_RE.is_match(filename)
}

/// Swap a trailing `.from_ext` (any case) for `.to_ext`, appending it when absent.
///
/// An all-uppercase source extension yields an uppercase replacement.
pub fn swap_extension(name: &str, from_ext: &str, to_ext: &str) -> String {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        if ext.eq_ignore_ascii_case(from_ext) {
            let upper = ext.chars().any(|c| c.is_ascii_alphabetic())
                && !ext.chars().any(|c| c.is_ascii_lowercase());
            let to = if upper {
                to_ext.to_ascii_uppercase()
            } else {
                to_ext.to_string()
            };
            return format!("{}.{}", stem, to);
        }
    }
    format!("{}.{}", name, to_ext)
}

/// Name of the sidecar for an audio file named `audio_name`, keeping the sidecar's own extension.
pub fn sidecar_name(audio_name: &str, audio_ext: &str, sidecar_ext: &str) -> String {
    match audio_name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case(audio_ext) => format!("{}.{}", stem, sidecar_ext),
        _ => format!("{}.{}", audio_name, sidecar_ext),
    }
}

/// `name` with its extension lowercased, for case-insensitive filename lookups.
pub fn fold_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{}", stem, ext.to_ascii_lowercase()),
        None => name.to_string(),
    }
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ts() -> NaiveDateTime {
        date::parse_sidecar_timestamp("14.08.2023 23:45:10").unwrap()
    }

    #[test]
    fn test_good_name_with_position() {
        let name = good_name(Some(&ts()), Some((52.1234, 0.5678)), "Location3_REC001.wav", "wav");
        assert_eq!(name.as_deref(), Some("52~1234+0~5678_20230814_234510.wav"));
    }

    #[test]
    fn test_good_name_pads_and_signs_coordinates() {
        let name = good_name(Some(&ts()), Some((52.1, -1.25)), "x.wav", "wav").unwrap();
        assert_eq!(name, "52~1000+-1~2500_20230814_234510.wav");
        assert!(!name.trim_end_matches(".wav").contains('.'));
        assert!(is_already_renamed(&name));
    }

    #[test]
    fn test_good_name_without_position() {
        let name = good_name(Some(&ts()), None, "Location3_REC001.wav", "wav");
        assert_eq!(name.as_deref(), Some("20230814_234510_Location3_REC001.wav"));
        assert!(!is_already_renamed(name.as_deref().unwrap()));
    }

    #[test]
    fn test_good_name_needs_timestamp() {
        assert_eq!(good_name(None, Some((52.0, 0.5)), "Location3_REC001.wav", "wav"), None);
        assert_eq!(good_name(None, None, "Location3_REC001.wav", "wav"), None);
    }

    #[test]
    fn test_bad_name_from_path() {
        let config = NamingConfig::default();
        let path = PathBuf::from("/data/North Wood/Night1/Location3_REC001.wav");
        let a = propose(&path, None, None, "North Wood", &config);
        let b = propose(&path, Some(&ts()), Some((1.0, 2.0)), "North Wood", &config);
        assert_eq!(a.bad_name, "North Wood_Night1_Location3_REC001.wav");
        assert_eq!(a.bad_name, b.bad_name);
        assert_eq!(a.good_name, None);
        assert_eq!(bad_name(" Site", "Night1", "rec.wav "), "Site_Night1_rec.wav");
    }

    #[test]
    fn test_strip_to_marker() {
        assert_eq!(
            strip_to_marker("Site_Night1_Location3_REC001.wav", "Location"),
            "Location3_REC001.wav"
        );
        assert_eq!(strip_to_marker("Location3_REC001.wav", "Location"), "Location3_REC001.wav");
        assert_eq!(strip_to_marker("REC001.wav", "Location"), "REC001.wav");
        assert_eq!(strip_to_marker("REC001.wav", ""), "REC001.wav");
    }

    #[test]
    fn test_already_renamed_pattern() {
        assert!(is_already_renamed("52~1234+0~5678_20230814_234510.wav"));
        assert!(is_already_renamed("-3~7000+-51~1200_20230814_234510.xml"));
        assert!(!is_already_renamed("Site_Night1_Location3_REC001.wav"));
        assert!(!is_already_renamed("52.1234+0.5678_20230814_234510.wav"));
    }

    #[test]
    fn test_swap_extension() {
        assert_eq!(swap_extension("a_b.wav", "wav", "xml"), "a_b.xml");
        assert_eq!(swap_extension("a_b.WAV", "wav", "xml"), "a_b.XML");
        assert_eq!(swap_extension("a_b.xml", "xml", "wav"), "a_b.wav");
        assert_eq!(swap_extension("a_b", "wav", "xml"), "a_b.xml");
    }

    #[test]
    fn test_sidecar_name_keeps_sidecar_extension() {
        assert_eq!(sidecar_name("a_b.WAV", "wav", "xml"), "a_b.xml");
        assert_eq!(sidecar_name("a_b.wav", "wav", "XML"), "a_b.XML");
        assert_eq!(sidecar_name("a_b", "wav", "xml"), "a_b.xml");
    }

    #[test]
    fn test_fold_extension() {
        assert_eq!(fold_extension("Location1_REC001.WAV"), "Location1_REC001.wav");
        assert_eq!(fold_extension("Location1_REC001.wav"), "Location1_REC001.wav");
        assert_eq!(fold_extension("REC001"), "REC001");
    }
}
