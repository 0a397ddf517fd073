//! Table export — renders the stored tables as HTML or CSV files.
//!
//! Exports read rows exactly as stored. With `decrypt` set, every non-key
//! column is run through the codec first; a value that fails to decrypt
//! aborts the export rather than writing a partial file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::codec::FieldCodec;
use crate::error::ExportError;
use crate::store::{RecordStore, Table};

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Html,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Render one table in `format`.
pub async fn export_table(
    store: &dyn RecordStore,
    codec: &FieldCodec,
    table: Table,
    format: ExportFormat,
    decrypt: bool,
) -> Result<String, ExportError> {
    let rows = load_rows(store, codec, table, decrypt).await?;
    Ok(match format {
        ExportFormat::Html => render_html(table, &rows),
        ExportFormat::Csv => render_csv(table, &rows),
    })
}

/// Write `<table>.<ext>` for every table into `dir`, creating it if needed.
/// Existing files are overwritten. Returns the written paths.
pub async fn export_all(
    store: &dyn RecordStore,
    codec: &FieldCodec,
    dir: &Path,
    format: ExportFormat,
    decrypt: bool,
) -> Result<Vec<PathBuf>, ExportError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ExportError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let body = export_table(store, codec, table, format, decrypt).await?;
        let path = dir.join(format!("{table}.{}", format.extension()));
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| ExportError::Write {
                path: path.clone(),
                source,
            })?;
        written.push(path);
    }
    Ok(written)
}

async fn load_rows(
    store: &dyn RecordStore,
    codec: &FieldCodec,
    table: Table,
    decrypt: bool,
) -> Result<Vec<Vec<String>>, ExportError> {
    let stored = store.list_rows(table).await?;
    let mut rows = Vec::with_capacity(stored.len());
    for row in stored {
        let mut cells = Vec::with_capacity(row.columns.len());
        for (column, value) in row.columns {
            if decrypt && table.is_encrypted(column) {
                let plain = codec.decrypt(&value).map_err(|source| ExportError::Decrypt {
                    table: table.as_str(),
                    column,
                    source,
                })?;
                cells.push(plain);
            } else {
                cells.push(value);
            }
        }
        rows.push(cells);
    }
    Ok(rows)
}

fn render_html(table: Table, rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{table}</title>");
    out.push_str("</head>\n<body>\n<table border=\"1\">\n  <thead>\n    <tr>\n");
    for column in table.columns() {
        let _ = writeln!(out, "      <th>{}</th>", escape_html(column));
    }
    out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for row in rows {
        out.push_str("    <tr>\n");
        for cell in row {
            let _ = writeln!(out, "      <td>{}</td>", escape_html(cell));
        }
        out.push_str("    </tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n</body>\n</html>\n");
    out
}

fn render_csv(table: Table, rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    push_csv_line(&mut out, table.columns().iter().copied());
    for row in rows {
        push_csv_line(&mut out, row.iter().map(String::as_str));
    }
    out
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\r', '\n']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Scheduled export ────────────────────────────────────────────────

/// A recurring export of every table into one directory.
pub struct ExportJob {
    pub store: Arc<dyn RecordStore>,
    pub codec: FieldCodec,
    pub dir: PathBuf,
    pub format: ExportFormat,
    pub decrypt: bool,
}

impl ExportJob {
    pub async fn run(&self) -> Result<Vec<PathBuf>, ExportError> {
        export_all(
            self.store.as_ref(),
            &self.codec,
            &self.dir,
            self.format,
            self.decrypt,
        )
        .await
    }
}

/// Spawn a task that runs `job` at every fire time of `schedule`
/// (7-field cron expression, UTC).
pub fn spawn_export_schedule(
    job: ExportJob,
    schedule: &str,
) -> Result<tokio::task::JoinHandle<()>, ExportError> {
    let schedule =
        cron::Schedule::from_str(schedule).map_err(|e| ExportError::Schedule(e.to_string()))?;

    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Export schedule has no upcoming fire time, stopping");
                return;
            };
            info!(next = %next, dir = %job.dir.display(), "Next export scheduled");
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match job.run().await {
                Ok(paths) => info!(files = paths.len(), "Export written"),
                Err(e) => error!("Scheduled export failed: {}", e),
            }
        }
    }))
}
