use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::reconcile::{TableOutcome, TableStatus};
use crate::renamer::FileOutcome;

#[derive(Serialize)]
struct RenameRow<'a> {
    path: String,
    kind: &'a str,
    outcome: &'a str,
}

#[derive(Serialize)]
struct TableRow<'a> {
    path: String,
    rows: usize,
    changed: usize,
    percent: String,
    status: &'a str,
    error: &'a str,
}

fn writer(path: &Path) -> anyhow::Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).with_context(|| format!("cannot write report {}", path.display()))
}

/// One row per live file with its terminal outcome.
pub fn write_rename_report(path: &Path, outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = writer(path)?;
    for o in outcomes {
        wtr.serialize(RenameRow {
            path: o.path.display().to_string(),
            kind: o.kind.as_str(),
            outcome: o.outcome.as_str(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row per results table with the share of rows it changed.
pub fn write_table_report(path: &Path, outcomes: &[TableOutcome]) -> anyhow::Result<()> {
    let mut wtr = writer(path)?;
    for o in outcomes {
        let error = match &o.status {
            TableStatus::Ok => "",
            TableStatus::Failed(reason) => reason.as_str(),
        };
        wtr.serialize(TableRow {
            path: o.path.display().to_string(),
            rows: o.rows,
            changed: o.changed,
            percent: format!("{:.2}", o.percent()),
            status: o.status.as_str(),
            error,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
