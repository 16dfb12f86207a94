//! Dataset indexing: directory walk, catalog construction, dataset stats.
//!
//! The indexer walks the dataset tree once, parses every regular file's name
//! into entities, resolves inherited sidecar metadata, joins the
//! participants row, and produces an immutable [`Catalog`] of
//! [`FileRecord`]s. Walk order is sorted by file name at every level so the
//! catalog order is stable across platforms. Index files (`*_scans.tsv`,
//! `*_sessions.tsv`, `participants.tsv`, JSON sidecars) are indexed like any
//! other file but never receive a datatype.

use crate::error::BiqlError;
use crate::filename::{datatype_from_path, parse_filename, ParsedName};
use crate::model::{FileRecord, Value};
use crate::participants::ParticipantsTable;
use crate::sidecar::SidecarIndex;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// Cooperative cancellation flag, checked between files during indexing and
/// between records during evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Share the underlying flag, e.g. with a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Aggregate numbers over an indexed dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub total_files: usize,
    pub total_subjects: usize,
    /// File counts per datatype, sorted by label.
    pub files_by_datatype: BTreeMap<String, usize>,
    /// Sorted distinct `sub` entity values.
    pub subjects: Vec<String>,
    /// Sorted distinct datatype labels.
    pub datatypes: Vec<String>,
}

/// The immutable, ordered collection of records for one dataset.
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    records: Vec<FileRecord>,
}

impl Catalog {
    /// Assemble a catalog directly from records, bypassing the walk.
    #[cfg(test)]
    pub(crate) fn from_records(records: Vec<FileRecord>) -> Catalog {
        Catalog {
            root: PathBuf::from("/test"),
            records,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> DatasetStats {
        let mut subjects = BTreeSet::new();
        let mut files_by_datatype = BTreeMap::new();
        for record in &self.records {
            if let Some(sub) = record.entities.get("sub") {
                subjects.insert(sub.clone());
            }
            if let Some(ref datatype) = record.datatype {
                *files_by_datatype.entry(datatype.clone()).or_insert(0) += 1;
            }
        }
        DatasetStats {
            total_files: self.records.len(),
            total_subjects: subjects.len(),
            datatypes: files_by_datatype.keys().cloned().collect(),
            files_by_datatype,
            subjects: subjects.into_iter().collect(),
        }
    }

    /// Entity names mapped to their sorted distinct values, for
    /// `--show-entities`.
    pub fn entity_summary(&self) -> BTreeMap<String, Vec<String>> {
        let mut summary: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in &self.records {
            for (key, value) in &record.entities {
                summary.entry(key.clone()).or_default().insert(value.clone());
            }
        }
        summary
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect()
    }
}

/// Index files never get a datatype even when they sit inside a datatype
/// directory.
fn is_index_file(filename: &str, extension: &str) -> bool {
    extension == ".json"
        || filename == "participants.tsv"
        || filename.ends_with("_scans.tsv")
        || filename.ends_with("_sessions.tsv")
}

/// Walk `root` and build the catalog. Returns the catalog plus the build
/// warning sink (sidecar parse failures, participants row issues).
pub fn build_catalog(
    root: &Path,
    cancel: &CancelToken,
) -> Result<(Catalog, Vec<String>), BiqlError> {
    if !root.exists() {
        return Err(BiqlError::DatasetNotFound {
            path: root.display().to_string(),
        });
    }
    if !root.is_dir() {
        return Err(BiqlError::DatasetUnreadable {
            path: root.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }
    let root = root
        .canonicalize()
        .map_err(|e| BiqlError::DatasetUnreadable {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut warnings = Vec::new();

    // First pass: discover files in walk order, parse JSON sidecars once.
    let mut discovered: Vec<(PathBuf, ParsedName)> = Vec::new();
    let mut sidecars = SidecarIndex::new();
    let mut seen = HashSet::new();
    let walker = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name().to_str()));
    for entry in walker {
        if cancel.is_cancelled() {
            warnings.push("indexing cancelled".to_string());
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warnings.push(format!("walk error: {}", err));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        // Follow symlinks once: a target already visited under another name
        // is skipped.
        let canonical = entry
            .path()
            .canonicalize()
            .unwrap_or_else(|_| entry.path().to_path_buf());
        if !seen.insert(canonical) {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().to_string();
        let parsed = parse_filename(&filename);
        if parsed.extension == ".json" {
            match std::fs::read_to_string(entry.path())
                .map_err(BiqlError::from)
                .and_then(|text| Ok(serde_json::from_str::<serde_json::Value>(&text)?))
            {
                Ok(json) => sidecars.insert(entry.path(), &parsed, &json),
                Err(err) => {
                    let message =
                        format!("sidecar skipped: {}: {}", entry.path().display(), err);
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
        }
        discovered.push((entry.path().to_path_buf(), parsed));
    }

    let (participants, participant_warnings) =
        ParticipantsTable::load(&root.join("participants.tsv"));
    for warning in &participant_warnings {
        warn!("{}", warning);
    }
    warnings.extend(participant_warnings);

    // Second pass: materialize records in walk order.
    let mut records = Vec::with_capacity(discovered.len());
    for (path, parsed) in discovered {
        if cancel.is_cancelled() {
            break;
        }
        records.push(make_record(&root, &path, parsed, &sidecars, &participants));
    }
    debug!("indexed {} files under {}", records.len(), root.display());

    Ok((Catalog { root, records }, warnings))
}

fn make_record(
    root: &Path,
    path: &Path,
    parsed: ParsedName,
    sidecars: &SidecarIndex,
    participants: &ParticipantsTable,
) -> FileRecord {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let relative_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    let index_file = is_index_file(&filename, &parsed.extension);
    let datatype = if index_file {
        None
    } else {
        datatype_from_path(path)
    };

    // Sidecars contribute metadata to data files only; a sidecar indexed as
    // a record carries none itself.
    let metadata = if parsed.extension == ".json" {
        IndexMap::new()
    } else {
        sidecars.resolve(root, path, &parsed)
    };

    let participant_row: IndexMap<String, Value> = parsed
        .entities
        .get("sub")
        .and_then(|sub| participants.get(sub))
        .cloned()
        .unwrap_or_default();

    FileRecord {
        filepath: path.to_string_lossy().to_string(),
        relative_path,
        filename,
        extension: parsed.extension.clone(),
        entities: parsed.entities,
        suffix: parsed.suffix,
        datatype,
        metadata,
        participants: participant_row,
    }
}

fn is_hidden(name: Option<&str>) -> bool {
    name.map(|n| n.starts_with('.') && n.len() > 1).unwrap_or(false)
}
