pub mod guess;

use chrono::{NaiveDateTime, Timelike};

/// Sortable form used in filenames and in the persisted catalog.
pub const COMPACT_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Length of a timestamp in `COMPACT_FORMAT`.
pub const COMPACT_LEN: usize = 15;
/// Form written by the recorders into the sidecar.
pub const SIDECAR_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

const TABLE_DATE_FORMAT: &str = "%d/%m/%Y";
const TABLE_TIME_FORMAT: &str = "%H:%M:%S";

pub fn to_compact(dt: &NaiveDateTime) -> String {
    dt.format(COMPACT_FORMAT).to_string()
}

pub fn parse_compact(s: &str) -> Option<NaiveDateTime> {
    if s.len() != COMPACT_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(s, COMPACT_FORMAT).ok()
}

pub fn parse_sidecar_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), SIDECAR_FORMAT).ok()
}

/// Date and time columns of one detection row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionFields {
    pub actual_date: String,
    pub survey_date: String,
    pub time: String,
}

/// Derive the table fields for a detection at `dt`.
///
/// Recordings run overnight: anything before noon belongs to the survey night
/// that started the previous calendar day.
pub fn detection_fields(dt: &NaiveDateTime) -> DetectionFields {
    let actual = dt.date();
    let survey = if dt.hour() < 12 {
        actual.pred_opt().unwrap_or(actual)
    } else {
        actual
    };
    DetectionFields {
        actual_date: actual.format(TABLE_DATE_FORMAT).to_string(),
        survey_date: survey.format(TABLE_DATE_FORMAT).to_string(),
        time: dt.format(TABLE_TIME_FORMAT).to_string(),
    }
}

/// Serde adapter storing `Option<NaiveDateTime>` as a compact string, empty for `None`.
pub mod compact_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_str(&super::to_compact(dt)),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = String::deserialize(d)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        super::parse_compact(raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("bad timestamp {:?}", raw)))
    }
}
