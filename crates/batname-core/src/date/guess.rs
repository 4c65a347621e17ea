use chrono::NaiveDateTime;
use std::path::Path;

use crate::date::{parse_compact, COMPACT_LEN};
use crate::naming;

/// Read the timestamp a canonical filename carries at its fixed position.
///
/// Position-first names (`52~1234+0~5678_20230814_234510.wav`) hold it just
/// before the extension; timestamp-first names hold it at the start.
pub fn embedded_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
        .trim();

    let slice = if naming::is_already_renamed(basename) {
        let stem = basename.rsplit_once('.').map_or(basename, |(stem, _)| stem);
        stem.get(stem.len().checked_sub(COMPACT_LEN)?..)?
    } else {
        basename.get(..COMPACT_LEN)?
    };
    parse_compact(slice)
}
