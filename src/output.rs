//! Output formatting for query results.
//!
//! Five formats: `json` (native scalars, projection keys in insertion
//! order), `table` (monospaced with `|` separators), `csv`/`tsv` (csv-crate
//! quoting, arrays as JSON-encoded strings), and `paths` (one matched file
//! path per line, pre-grouping, ignoring SELECT).

use crate::error::BiqlError;
use crate::eval::{ResultSet, Row};
use crate::model::Value;
use clap::ValueEnum;
use std::fmt;

/// Table cells stop inlining arrays beyond this rendered width.
const MAX_TABLE_CELL_WIDTH: usize = 40;

/// Output format for query results.
#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// JSON list of row objects (default)
    #[default]
    Json,
    /// Monospaced table
    Table,
    /// Comma-separated values with header row
    Csv,
    /// Tab-separated values with header row
    Tsv,
    /// Matched file paths, one per line
    Paths,
}

impl OutputFormat {
    /// Resolve a `FORMAT` clause name.
    pub fn from_name(name: &str) -> Option<OutputFormat> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "table" => Some(OutputFormat::Table),
            "csv" => Some(OutputFormat::Csv),
            "tsv" => Some(OutputFormat::Tsv),
            "paths" => Some(OutputFormat::Paths),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Paths => "paths",
        };
        write!(f, "{}", value)
    }
}

/// Render a result set in the requested format.
pub fn render(result: &ResultSet, format: OutputFormat) -> Result<String, BiqlError> {
    match format {
        OutputFormat::Json => render_json(&result.rows),
        OutputFormat::Table => Ok(render_table(&result.rows)),
        OutputFormat::Csv => render_delimited(&result.rows, b','),
        OutputFormat::Tsv => render_delimited(&result.rows, b'\t'),
        OutputFormat::Paths => Ok(render_paths(&result.matched_paths)),
    }
}

fn render_json(rows: &[Row]) -> Result<String, BiqlError> {
    let objects: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::Value::Object(
                row.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            )
        })
        .collect();
    Ok(serde_json::to_string_pretty(&objects)?)
}

/// Column names across all rows, first-seen order.
fn columns(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

fn table_cell(value: &Value) -> String {
    match value {
        Value::List(items) => {
            let inline = value.to_json().to_string();
            if inline.len() > MAX_TABLE_CELL_WIDTH {
                format!("[...{} items...]", items.len())
            } else {
                inline
            }
        }
        Value::Map(_) => {
            let inline = value.to_json().to_string();
            if inline.len() > MAX_TABLE_CELL_WIDTH {
                "{...}".to_string()
            } else {
                inline
            }
        }
        other => other.as_display_string(),
    }
}

fn render_table(rows: &[Row]) -> String {
    let columns = columns(rows);
    if columns.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|name| row.get(name).map(table_cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{:<width$}", name, width = widths[i]))
        .collect();
    out.push_str(header.join(" | ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        out.push_str(line.join(" | ").trim_end());
        out.push('\n');
    }
    out
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::List(_) | Value::Map(_) => value.to_json().to_string(),
        other => other.as_display_string(),
    }
}

fn render_delimited(rows: &[Row], delimiter: u8) -> Result<String, BiqlError> {
    let columns = columns(rows);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer
        .write_record(&columns)
        .map_err(|e| BiqlError::OutputError {
            reason: e.to_string(),
        })?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|name| row.get(name).map(csv_cell).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| BiqlError::OutputError {
                reason: e.to_string(),
            })?;
    }

    let bytes = writer.into_inner().map_err(|e| BiqlError::OutputError {
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| BiqlError::OutputError {
        reason: e.to_string(),
    })
}

fn render_paths(paths: &[String]) -> String {
    let mut out = String::new();
    for path in paths {
        out.push_str(path);
        out.push('\n');
    }
    out
}
