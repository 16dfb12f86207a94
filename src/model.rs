//! Core data model: polymorphic attribute values and indexed file records.
//!
//! A [`FileRecord`] is the unit the query engine operates on: one per indexed
//! file, carrying the parsed filename entities, inherited sidecar metadata,
//! and the participants row for its subject. Records are self-contained
//! attribute bags with no back-references; the catalog that owns them is
//! immutable after construction.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// A polymorphic attribute value.
///
/// Entities are always stored as strings; numeric interpretation happens at
/// comparison time. Metadata and participants values keep their native JSON
/// shapes (scalars, arrays, nested objects).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Convert a parsed JSON value (sidecar contents) into a `Value`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON for output. Non-finite floats degrade to null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Parse a participants-table cell. The BIDS `n/a` marker loads as null;
    /// fully numeric cells coerce so `participants.age > 25` compares
    /// numerically without string fallbacks.
    pub fn from_tsv_cell(cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() || trimmed == "n/a" {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness for the existence probe: non-null and non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Int(_) | Value::Float(_) => true,
        }
    }

    /// Numeric view of the value, if one exists. Strings are parsed, which
    /// is what gives entity values like `"01"` their numeric comparisons.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) | Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Canonical string form used for glob/regex matching and table cells.
    pub fn as_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Map(_) => self.to_json().to_string(),
        }
    }

    /// Stable key form for DISTINCT and GROUP BY bucketing. Unlike
    /// `as_display_string`, null and the empty string produce distinct keys.
    pub fn partition_key(&self) -> String {
        self.to_json().to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

/// Computed (non-entity) fields resolvable by bare name.
const COMPUTED_FIELDS: &[&str] = &[
    "filename",
    "filepath",
    "relative_path",
    "extension",
    "suffix",
    "datatype",
];

/// One indexed file: a multi-namespace attribute bag.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    /// Absolute path to the file.
    pub filepath: String,
    /// Path relative to the dataset root.
    pub relative_path: String,
    /// Final path component.
    pub filename: String,
    /// Everything from the first `.` of the filename (so `.nii.gz` is one
    /// extension). Empty when the filename has no dot.
    pub extension: String,
    /// BIDS entities parsed from the filename (`sub` -> `"01"`, ...).
    /// Values are always strings; keys are not restricted to a known set.
    pub entities: IndexMap<String, String>,
    /// Terminal filename segment before the extension, when present.
    pub suffix: Option<String>,
    /// Datatype directory label (`anat`, `func`, ...) or None.
    pub datatype: Option<String>,
    /// Inherited sidecar metadata, nearest-ancestor override applied.
    pub metadata: IndexMap<String, Value>,
    /// Participants-table row for this record's subject, when both exist.
    pub participants: IndexMap<String, Value>,
}

impl FileRecord {
    /// Resolve a qualified identifier against this record.
    ///
    /// The first segment selects the namespace: `metadata` descends through
    /// the metadata map, `participants` does a flat lookup, anything else is
    /// a computed field or an entity. Bare names never reach into metadata
    /// or participants; missing keys resolve to null.
    pub fn lookup(&self, path: &[String]) -> Value {
        let Some(first) = path.first() else {
            return Value::Null;
        };
        match first.as_str() {
            "metadata" => self.lookup_metadata(&path[1..]),
            "participants" => match path {
                [_, key] => self
                    .participants
                    .get(key)
                    .cloned()
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            name if path.len() == 1 => self.lookup_bare(name),
            _ => Value::Null,
        }
    }

    fn lookup_bare(&self, name: &str) -> Value {
        if COMPUTED_FIELDS.contains(&name) {
            return match name {
                "filename" => Value::Str(self.filename.clone()),
                "filepath" => Value::Str(self.filepath.clone()),
                "relative_path" => Value::Str(self.relative_path.clone()),
                "extension" => Value::Str(self.extension.clone()),
                "suffix" => self
                    .suffix
                    .as_ref()
                    .map(|s| Value::Str(s.clone()))
                    .unwrap_or(Value::Null),
                "datatype" => self
                    .datatype
                    .as_ref()
                    .map(|s| Value::Str(s.clone()))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }
        self.entities
            .get(name)
            .map(|v| Value::Str(v.clone()))
            .unwrap_or(Value::Null)
    }

    fn lookup_metadata(&self, path: &[String]) -> Value {
        let Some(first) = path.first() else {
            return Value::Null;
        };
        let mut current = match self.metadata.get(first) {
            Some(v) => v.clone(),
            None => return Value::Null,
        };
        for segment in &path[1..] {
            current = match current {
                Value::Map(ref map) => match map.get(segment) {
                    Some(v) => v.clone(),
                    None => return Value::Null,
                },
                _ => return Value::Null,
            };
        }
        current
    }
}
