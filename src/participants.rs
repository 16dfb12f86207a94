//! participants.tsv loading.
//!
//! The participants table lives at the dataset root, tab-separated with a
//! header row, one row per subject keyed by `participant_id`. Rows are
//! indexed under both the full token (`sub-01`) and the bare label (`01`)
//! so either form of the `sub` entity resolves. A missing table is an empty
//! mapping; malformed rows are skipped with a warning.

use crate::model::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Per-subject attribute rows from participants.tsv.
#[derive(Debug, Default)]
pub struct ParticipantsTable {
    rows: HashMap<String, IndexMap<String, Value>>,
}

impl ParticipantsTable {
    /// Load the table at `path`. Returns the table plus any row-level
    /// warnings; an absent file yields an empty table and no warnings.
    pub fn load(path: &Path) -> (ParticipantsTable, Vec<String>) {
        let mut table = ParticipantsTable::default();
        let mut warnings = Vec::new();

        if !path.is_file() {
            return (table, warnings);
        }

        let mut reader = match csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_path(path)
        {
            Ok(reader) => reader,
            Err(err) => {
                warnings.push(format!("participants table unreadable: {}", err));
                return (table, warnings);
            }
        };

        let headers: Vec<String> = match reader.headers() {
            Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
            Err(err) => {
                warnings.push(format!("participants header unreadable: {}", err));
                return (table, warnings);
            }
        };
        let Some(id_column) = headers.iter().position(|h| h == "participant_id") else {
            warnings.push("participants table has no participant_id column".to_string());
            return (table, warnings);
        };

        for (line, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    warnings.push(format!("participants row {} skipped: {}", line + 2, err));
                    continue;
                }
            };
            let Some(id) = record.get(id_column).map(str::trim).filter(|s| !s.is_empty())
            else {
                warnings.push(format!(
                    "participants row {} skipped: empty participant_id",
                    line + 2
                ));
                continue;
            };
            if record.len() != headers.len() {
                warnings.push(format!(
                    "participants row {} skipped: {} fields, expected {}",
                    line + 2,
                    record.len(),
                    headers.len()
                ));
                continue;
            }

            let mut row = IndexMap::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                if header == "participant_id" {
                    row.insert(header.clone(), Value::Str(id.to_string()));
                } else {
                    row.insert(header.clone(), Value::from_tsv_cell(cell));
                }
            }

            // Index the row under both subject-token forms.
            let bare = id.strip_prefix("sub-").unwrap_or(id);
            table.rows.insert(id.to_string(), row.clone());
            table.rows.insert(bare.to_string(), row);
        }

        (table, warnings)
    }

    /// Look up a subject by bare label or full `sub-` token.
    pub fn get(&self, subject: &str) -> Option<&IndexMap<String, Value>> {
        self.rows.get(subject)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
