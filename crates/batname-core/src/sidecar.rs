use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::date;
use crate::naming;
use crate::NamingConfig;

/// What a recorder sidecar says about its audio file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarData {
    /// The sidecar existed and parsed.
    pub has_metadata: bool,
    pub timestamp: Option<NaiveDateTime>,
    /// (latitude, longitude), each rounded to 4 decimals
    pub position: Option<(f64, f64)>,
}

/// Locate the sidecar next to `audio`: same base name, metadata extension in any case.
pub fn find_sidecar(audio: &Path, config: &NamingConfig) -> Option<PathBuf> {
    if !naming::has_extension(audio, &config.audio_ext) {
        return None;
    }
    let direct = [
        config.meta_ext.to_ascii_lowercase(),
        config.meta_ext.to_ascii_uppercase(),
    ]
    .iter()
    .map(|ext| audio.with_extension(ext))
    .find(|candidate| candidate.is_file());
    if direct.is_some() {
        return direct;
    }

    // mixed case such as `.Xml`
    let stem = audio.file_stem()?;
    let dir = match audio.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.file_stem() == Some(stem) && naming::has_extension(p, &config.meta_ext))
        .filter(|p| p.is_file())
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Read the sidecar of `audio`. Missing or broken sidecars yield empty data.
pub fn read_sidecar(audio: &Path, config: &NamingConfig) -> SidecarData {
    let Some(path) = find_sidecar(audio, config) else {
        debug!("No sidecar for {}", audio.display());
        return SidecarData::default();
    };

    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read sidecar {}: {}", path.display(), e);
            return SidecarData::default();
        }
    };

    match parse_sidecar(&text, config) {
        Ok(data) => data,
        Err(e) => {
            warn!("Ignoring malformed sidecar {}: {}", path.display(), e);
            SidecarData::default()
        }
    }
}

/// Parse sidecar markup; only a markup error is an `Err`.
pub fn parse_sidecar(text: &str, config: &NamingConfig) -> anyhow::Result<SidecarData> {
    let doc = roxmltree::Document::parse(text)?;
    let element_text = |tag: &str| {
        doc.descendants()
            .find(|n| n.is_element() && n.has_tag_name(tag))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let timestamp = element_text(config.timestamp_tag.as_str()).and_then(date::parse_sidecar_timestamp);
    let position = element_text(config.position_tag.as_str()).and_then(parse_position);

    Ok(SidecarData {
        has_metadata: true,
        timestamp,
        position,
    })
}

/// `"lat lon"`; anything but exactly two finite numbers is no position at all.
fn parse_position(raw: &str) -> Option<(f64, f64)> {
    let mut parts = raw.split_whitespace();
    let lat = parts.next()?.parse::<f64>().ok()?;
    let lon = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some((round4(lat), round4(lon)))
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BatRecord>
  <Filename>Location3_REC001.wav</Filename>
  <DateTime>14.08.2023 23:45:10</DateTime>
  <GPS>
    <Position>52.12344 0.56776</Position>
  </GPS>
</BatRecord>"#;

    #[test]
    fn test_parse_full_sidecar() {
        let data = parse_sidecar(FULL, &NamingConfig::default()).unwrap();
        assert!(data.has_metadata);
        assert_eq!(date::to_compact(&data.timestamp.unwrap()), "20230814_234510");
        assert_eq!(data.position, Some((52.1234, 0.5678)));
    }

    #[test]
    fn test_missing_fields_stay_empty() {
        let config = NamingConfig::default();
        let data = parse_sidecar("<BatRecord><DateTime>garbage</DateTime></BatRecord>", &config).unwrap();
        assert!(data.has_metadata);
        assert_eq!(data.timestamp, None);
        assert_eq!(data.position, None);

        let data = parse_sidecar(
            "<BatRecord><DateTime>14.08.2023 23:45:10</DateTime><Position>52.1</Position></BatRecord>",
            &config,
        )
        .unwrap();
        assert!(data.timestamp.is_some());
        assert_eq!(data.position, None);
    }

    #[test]
    fn test_malformed_sidecar_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("Location3_REC001.wav");
        fs::write(&audio, b"RIFF").unwrap();
        fs::write(dir.path().join("Location3_REC001.xml"), "<BatRecord><DateTime>").unwrap();

        let config = NamingConfig::default();
        assert!(parse_sidecar("<BatRecord><DateTime>", &config).is_err());
        assert_eq!(read_sidecar(&audio, &config), SidecarData::default());
    }

    #[test]
    fn test_missing_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("Location3_REC001.wav");
        fs::write(&audio, b"RIFF").unwrap();

        let data = read_sidecar(&audio, &NamingConfig::default());
        assert!(!data.has_metadata);
        assert_eq!(data.timestamp, None);
    }

    #[test]
    fn test_sidecar_found_for_uppercase_audio_extension() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("Location3_REC001.WAV");
        fs::write(&audio, b"RIFF").unwrap();
        fs::write(dir.path().join("Location3_REC001.xml"), FULL).unwrap();

        let data = read_sidecar(&audio, &NamingConfig::default());
        assert!(data.has_metadata);
        assert_eq!(data.position, Some((52.1234, 0.5678)));
    }

    #[test]
    fn test_sidecar_found_for_mixed_case_extension() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("Location3_REC001.wav");
        fs::write(&audio, b"RIFF").unwrap();
        fs::write(dir.path().join("Location3_REC001.Xml"), FULL).unwrap();
        fs::write(dir.path().join("Location3_REC0011.Xml"), "").unwrap();

        let config = NamingConfig::default();
        let found = find_sidecar(&audio, &config).unwrap();
        assert_eq!(found.file_stem().and_then(|s| s.to_str()), Some("Location3_REC001"));
        assert!(read_sidecar(&audio, &config).has_metadata);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(52.12345678), 52.1235);
        assert_eq!(round4(-0.00004), -0.0);
    }
}
