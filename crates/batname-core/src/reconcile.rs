use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::date::{self, guess, DetectionFields};
use crate::matcher::Matcher;
use crate::naming;

pub const FILENAME_COLUMN: &str = "ORIGINAL.FILE.NAME";
pub const ACTUAL_DATE_COLUMN: &str = "ACTUAL.DATE";
pub const SURVEY_DATE_COLUMN: &str = "SURVEY.DATE";
pub const TIME_COLUMN: &str = "TIME";

#[derive(Debug, Clone, Copy)]
struct Columns {
    filename: usize,
    actual_date: usize,
    survey_date: usize,
    time: usize,
}

/// A detection results table held in memory; unknown columns pass through untouched.
#[derive(Debug, Clone)]
pub struct ResultsTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: Columns,
}

impl ResultsTable {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| anyhow::anyhow!("missing column {}", name))
        };
        let columns = Columns {
            filename: find(FILENAME_COLUMN)?,
            actual_date: find(ACTUAL_DATE_COLUMN)?,
            survey_date: find(SURVEY_DATE_COLUMN)?,
            time: find(TIME_COLUMN)?,
        };

        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self {
            headers,
            rows,
            columns,
        })
    }

    /// Read `path`, appending a missing final newline once if the first parse fails.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read table {}", path.display()))?;
        parse_with_newline_repair(text, Self::parse)
            .with_context(|| format!("unreadable table {}", path.display()))
    }

    /// Replace `path` with this table, via a temporary sibling.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let temp_path = path.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&temp_path)
                .with_context(|| format!("cannot write {}", temp_path.display()))?;
            wtr.write_record(&self.headers)?;
            for row in &self.rows {
                wtr.write_record(row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn filename(&self, row: usize) -> &str {
        self.cell(row, self.columns.filename)
    }

    pub fn fields(&self, row: usize) -> DetectionFields {
        DetectionFields {
            actual_date: self.cell(row, self.columns.actual_date).to_string(),
            survey_date: self.cell(row, self.columns.survey_date).to_string(),
            time: self.cell(row, self.columns.time).to_string(),
        }
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map(String::as_str).unwrap_or("")
    }

    fn set(&mut self, row: usize, col: usize, value: String) {
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value;
    }

    /// Write the three date columns of `row`; true if any value changed.
    fn set_fields(&mut self, row: usize, fields: DetectionFields) -> bool {
        let changed = self.fields(row) != fields;
        let c = self.columns;
        self.set(row, c.actual_date, fields.actual_date);
        self.set(row, c.survey_date, fields.survey_date);
        self.set(row, c.time, fields.time);
        changed
    }
}

/// Run `parse`; if it fails on text without a final newline, append one and run it once more.
fn parse_with_newline_repair<T>(
    mut text: String,
    parse: impl Fn(&str) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    match parse(&text) {
        Ok(parsed) => Ok(parsed),
        Err(e) if !text.ends_with('\n') => {
            warn!("{}; retrying with a final newline", e);
            text.push('\n');
            parse(&text)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableStatus {
    Ok,
    Failed(String),
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Ok => "ok",
            TableStatus::Failed(_) => "failed",
        }
    }
}

/// Result of one table: rows fixed (reconcile) or rows changed (retrofit).
#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    pub path: PathBuf,
    pub rows: usize,
    pub changed: usize,
    pub status: TableStatus,
}

impl TableOutcome {
    pub fn failed(path: &Path, error: &anyhow::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            rows: 0,
            changed: 0,
            status: TableStatus::Failed(format!("{:#}", error)),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.changed as f64 * 100.0 / self.rows as f64
        }
    }
}

/// Point every row at its good name; returns the number of rows fixed.
pub fn reconcile_rows(table: &mut ResultsTable, matcher: &Matcher) -> usize {
    let mut fixed = 0;
    for row in 0..table.len() {
        let current = table.filename(row).to_string();
        let Some(record) = matcher.match_exact(&current).unique() else {
            debug!("No unique catalog record for {}", current);
            continue;
        };
        let Some(good) = record.good_name.as_deref() else {
            debug!("No date info for {}", current);
            continue;
        };
        let Some(ts) = guess::embedded_timestamp(good).or(record.derived_timestamp) else {
            warn!("Good name {} carries no timestamp", good);
            continue;
        };
        let col = table.columns.filename;
        table.set(row, col, good.to_string());
        table.set_fields(row, date::detection_fields(&ts));
        fixed += 1;
    }
    fixed
}

/// Re-derive the date columns from each row's current filename; returns rows changed.
pub fn retrofit_rows(table: &mut ResultsTable) -> usize {
    let mut changed = 0;
    for row in 0..table.len() {
        let Some(ts) = guess::embedded_timestamp(table.filename(row)) else {
            continue;
        };
        if table.set_fields(row, date::detection_fields(&ts)) {
            changed += 1;
        }
    }
    changed
}

pub fn fix_table(path: &Path, matcher: &Matcher) -> anyhow::Result<TableOutcome> {
    let mut table = ResultsTable::read(path)?;
    let fixed = reconcile_rows(&mut table, matcher);
    table.write(path)?;
    Ok(TableOutcome {
        path: path.to_path_buf(),
        rows: table.len(),
        changed: fixed,
        status: TableStatus::Ok,
    })
}

pub fn retrofit_table(path: &Path) -> anyhow::Result<TableOutcome> {
    let mut table = ResultsTable::read(path)?;
    let changed = retrofit_rows(&mut table);
    if changed > 0 {
        table.write(path)?;
    }
    Ok(TableOutcome {
        path: path.to_path_buf(),
        rows: table.len(),
        changed,
        status: TableStatus::Ok,
    })
}

/// Expand directories into the `.csv` files below them; files pass through.
pub fn collect_tables(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut tables = Vec::new();
    for path in paths {
        if !path.is_dir() {
            tables.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && naming::has_extension(entry.path(), "csv") => {
                    tables.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => warn!("Error accessing entry: {}", e),
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogRecord};
    use crate::NamingConfig;

    fn record(site: &str, night: &str, filename: &str, good: Option<&str>) -> CatalogRecord {
        let path = PathBuf::from("/orig").join(site).join(night).join(filename);
        CatalogRecord {
            original_dir: path.parent().unwrap().to_path_buf(),
            original_path: path,
            original_filename: filename.to_string(),
            has_metadata: good.is_some(),
            derived_timestamp: None,
            latitude: None,
            longitude: None,
            good_name: good.map(str::to_string),
            bad_name: naming::bad_name(site, night, filename),
            site_long: site.to_string(),
            site_short: site.to_string(),
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            record("Fen", "Night1", "Location1_REC001.wav", Some("52~1234+0~5678_20230815_003010.wav")),
            record("Fen", "Night1", "Location1_REC002.wav", Some("20230814_234510_Location1_REC002.wav")),
            record("Fen", "Night1", "Location1_REC003.wav", None),
            record("Fen", "Night1", "Location1_REC004.wav", Some("x.wav")),
            record("Moor", "Night1", "Location1_REC004.wav", Some("y.wav")),
        ])
    }

    const TABLE: &str = "\
SPECIES,ORIGINAL.FILE.NAME,ACTUAL.DATE,SURVEY.DATE,TIME
Pippip,Fen_Night1_Location1_REC001.wav,,,
Nyclei,Fen_Night1_Location1_REC002.wav,01/01/2000,01/01/2000,12:00:00
Pippip,Fen_Night1_Location1_REC003.wav,a,b,c
Myodau,Fen_Night1_Location1_REC004.wav,a,b,c
Pippip,Fen_Night1_Location1_REC009.wav,a,b,c
";

    #[test]
    fn test_reconcile_rows() {
        let catalog = catalog();
        let config = NamingConfig::default();
        let matcher = Matcher::new(&catalog, &config);
        let mut table = ResultsTable::parse(TABLE).unwrap();

        assert_eq!(reconcile_rows(&mut table, &matcher), 2);

        assert_eq!(table.filename(0), "52~1234+0~5678_20230815_003010.wav");
        let f = table.fields(0);
        assert_eq!(f.time, "00:30:10");
        assert_eq!(f.actual_date, "15/08/2023");
        assert_eq!(f.survey_date, "14/08/2023");

        assert_eq!(table.filename(1), "20230814_234510_Location1_REC002.wav");
        let f = table.fields(1);
        assert_eq!(f.time, "23:45:10");
        assert_eq!(f.actual_date, "14/08/2023");
        assert_eq!(f.survey_date, "14/08/2023");

        // no date info, ambiguous, unknown
        assert_eq!(table.filename(2), "Fen_Night1_Location1_REC003.wav");
        assert_eq!(table.fields(2).time, "c");
        assert_eq!(table.filename(3), "Fen_Night1_Location1_REC004.wav");
        assert_eq!(table.filename(4), "Fen_Night1_Location1_REC009.wav");
    }

    #[test]
    fn test_fix_table_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, TABLE).unwrap();

        let catalog = catalog();
        let config = NamingConfig::default();
        let matcher = Matcher::new(&catalog, &config);
        let outcome = fix_table(&path, &matcher).unwrap();
        assert_eq!(outcome.rows, 5);
        assert_eq!(outcome.changed, 2);
        assert!((outcome.percent() - 40.0).abs() < 1e-9);

        let reread = ResultsTable::read(&path).unwrap();
        assert_eq!(reread.filename(0), "52~1234+0~5678_20230815_003010.wav");
        assert_eq!(reread.headers[0], "SPECIES");
        assert_eq!(reread.rows[0][0], "Pippip");
        assert!(!dir.path().join("results.csv.tmp").exists());
    }

    #[test]
    fn test_missing_final_newline_parses_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, TABLE.trim_end()).unwrap();

        let table = ResultsTable::read(&path).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.filename(4), "Fen_Night1_Location1_REC009.wav");
    }

    fn terminated_only(text: &str) -> anyhow::Result<usize> {
        if text.ends_with('\n') {
            Ok(text.lines().count())
        } else {
            anyhow::bail!("unterminated record")
        }
    }

    #[test]
    fn test_newline_repair_retries_once() {
        let calls = std::cell::Cell::new(0);
        let parse = |text: &str| {
            calls.set(calls.get() + 1);
            terminated_only(text)
        };
        assert_eq!(parse_with_newline_repair("a\nb".to_string(), parse).unwrap(), 2);
        assert_eq!(calls.get(), 2);

        // already terminated: no repair to try
        calls.set(0);
        let always_fails = |_: &str| -> anyhow::Result<usize> {
            calls.set(calls.get() + 1);
            anyhow::bail!("bad table")
        };
        assert!(parse_with_newline_repair("a\n".to_string(), always_fails).is_err());
        assert_eq!(calls.get(), 1);

        // repaired text still fails
        calls.set(0);
        assert!(parse_with_newline_repair("a".to_string(), always_fails).is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_missing_column_fails_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "ORIGINAL.FILE.NAME,TIME\na.wav,00:00:00\n").unwrap();
        assert!(ResultsTable::read(&path).is_err());
    }

    #[test]
    fn test_retrofit_counts_real_changes() {
        let text = "\
ORIGINAL.FILE.NAME,ACTUAL.DATE,SURVEY.DATE,TIME
52~1234+0~5678_20230815_003010.wav,15/08/2023,14/08/2023,00:30:10
20230814_234510_Location1_REC002.wav,14/08/2023,13/08/2023,23:45:10
Fen_Night1_Location1_REC003.wav,a,b,c
";
        let mut table = ResultsTable::parse(text).unwrap();
        assert_eq!(retrofit_rows(&mut table), 1);
        assert_eq!(table.fields(1).survey_date, "14/08/2023");
        assert_eq!(table.fields(2).time, "c");
    }

    #[test]
    fn test_retrofit_table_leaves_unchanged_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let text = "ORIGINAL.FILE.NAME,ACTUAL.DATE,SURVEY.DATE,TIME\n\
                    20230814_234510_x.wav,14/08/2023,14/08/2023,23:45:10\n";
        fs::write(&path, text).unwrap();

        let outcome = retrofit_table(&path).unwrap();
        assert_eq!(outcome.changed, 0);
        assert_eq!(outcome.rows, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_collect_tables() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.csv"), "").unwrap();
        fs::write(dir.path().join("sub").join("a.CSV"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let extra = PathBuf::from("/elsewhere/c.csv");
        let tables = collect_tables(&[dir.path().to_path_buf(), extra.clone()]);
        assert_eq!(
            tables,
            vec![dir.path().join("b.csv"), dir.path().join("sub").join("a.CSV"), extra]
        );
    }
}
