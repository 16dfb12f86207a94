//! JSON sidecar metadata and BIDS inheritance.
//!
//! A sidecar applies to a data file when the sidecar's entity set is a
//! subset of the file's entity set and its suffix (when it has one) matches
//! the file's. Sidecars are merged root-to-leaf, less specific before more
//! specific, so the nearest-ancestor, most-specific value wins key by key.
//! Nested objects merge shallowly at each level rather than being replaced
//! wholesale.

use crate::filename::ParsedName;
use crate::model::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A parsed JSON sidecar, keyed for applicability checks.
#[derive(Debug, Clone)]
pub struct Sidecar {
    /// Entities parsed from the sidecar's stem.
    pub entities: IndexMap<String, String>,
    /// Suffix parsed from the sidecar's stem, when present.
    pub suffix: Option<String>,
    /// Parsed contents.
    pub contents: IndexMap<String, Value>,
}

impl Sidecar {
    pub fn new(parsed: &ParsedName, json: &serde_json::Value) -> Sidecar {
        let contents = match Value::from_json(json) {
            Value::Map(map) => map,
            // Non-object sidecars contribute nothing but are not an error.
            _ => IndexMap::new(),
        };
        Sidecar {
            entities: parsed.entities.clone(),
            suffix: parsed.suffix.clone(),
            contents,
        }
    }

    /// Whether this sidecar's key-value pairs apply to a file with the given
    /// entities and suffix.
    pub fn applies_to(
        &self,
        entities: &IndexMap<String, String>,
        suffix: Option<&str>,
    ) -> bool {
        if let Some(ref own) = self.suffix {
            if suffix != Some(own.as_str()) {
                return false;
            }
        }
        self.entities
            .iter()
            .all(|(k, v)| entities.get(k) == Some(v))
    }
}

/// All sidecars in a dataset, grouped by containing directory.
#[derive(Debug, Default)]
pub struct SidecarIndex {
    by_dir: HashMap<PathBuf, Vec<Sidecar>>,
}

impl SidecarIndex {
    pub fn new() -> SidecarIndex {
        SidecarIndex::default()
    }

    /// Register a sidecar found at `path` during the walk.
    pub fn insert(&mut self, path: &Path, parsed: &ParsedName, json: &serde_json::Value) {
        let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        self.by_dir
            .entry(dir)
            .or_default()
            .push(Sidecar::new(parsed, json));
    }

    /// Effective metadata for a data file: walk each ancestor directory from
    /// the dataset root down to the file's own directory and merge every
    /// applicable sidecar, least specific first.
    pub fn resolve(
        &self,
        root: &Path,
        file_path: &Path,
        parsed: &ParsedName,
    ) -> IndexMap<String, Value> {
        let mut merged = IndexMap::new();
        for dir in ancestor_chain(root, file_path) {
            let Some(sidecars) = self.by_dir.get(&dir) else {
                continue;
            };
            let mut applicable: Vec<&Sidecar> = sidecars
                .iter()
                .filter(|s| s.applies_to(&parsed.entities, parsed.suffix.as_deref()))
                .collect();
            // Within one directory, fewer entities means less specific;
            // the sort is stable so ties keep walk order.
            applicable.sort_by_key(|s| s.entities.len());
            for sidecar in applicable {
                merge_map(&mut merged, &sidecar.contents);
            }
        }
        merged
    }
}

/// Directories from `root` (inclusive) down to the file's parent.
fn ancestor_chain(root: &Path, file_path: &Path) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    let Some(parent) = file_path.parent() else {
        return chain;
    };
    let mut current = parent;
    loop {
        chain.push(current.to_path_buf());
        if current == root {
            break;
        }
        match current.parent() {
            Some(up) => current = up,
            None => break,
        }
    }
    chain.reverse();
    chain
}

/// Key-by-key override; nested maps merge one level at a time.
fn merge_map(dst: &mut IndexMap<String, Value>, src: &IndexMap<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => {
                merge_map(existing, incoming);
            }
            (Some(slot), incoming) => *slot = incoming.clone(),
            (None, incoming) => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}
