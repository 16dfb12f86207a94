//! BIDS filename parsing.
//!
//! Decomposes a filename like `sub-01_ses-pre_task-nback_run-2_bold.nii.gz`
//! into its entity map (`sub -> 01`, `ses -> pre`, ...), the suffix
//! (`bold`), and the extension (`.nii.gz`). Parsing is tolerant: malformed
//! names yield whatever entities were recognizable and no suffix. It never
//! fails.

use indexmap::IndexMap;
use std::path::Path;

/// Recognized BIDS datatype directory labels. A file's datatype is the name
/// of its immediate parent directory when that name is in this set.
pub const DATATYPE_LABELS: &[&str] = &[
    "anat", "func", "dwi", "beh", "eeg", "meg", "ieeg", "fmap", "pet", "perf", "micr",
];

/// Result of parsing a BIDS filename.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedName {
    /// `key-value` segments, in filename order.
    pub entities: IndexMap<String, String>,
    /// Trailing dash-less segment, when present.
    pub suffix: Option<String>,
    /// Everything from the first `.` to the end (`.nii.gz` stays whole).
    /// Empty for dot-less names.
    pub extension: String,
}

/// Parse a bare filename (no directory components).
pub fn parse_filename(filename: &str) -> ParsedName {
    let (stem, extension) = split_extension(filename);

    let mut entities = IndexMap::new();
    let mut suffix = None;

    let segments: Vec<&str> = stem.split('_').collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('-') {
            Some((key, value)) if !key.is_empty() => {
                entities.insert(key.to_string(), value.to_string());
            }
            _ => {
                // Dash-less segments are the suffix only in last position;
                // anywhere else they are ignored.
                if i == last {
                    suffix = Some(segment.to_string());
                }
            }
        }
    }

    ParsedName {
        entities,
        suffix,
        extension: extension.to_string(),
    }
}

/// Split `name` at the first dot: (`stem`, `extension`).
fn split_extension(name: &str) -> (&str, &str) {
    match name.find('.') {
        Some(idx) => (&name[..idx], &name[idx..]),
        None => (name, ""),
    }
}

/// Datatype of a file, inferred from the directory immediately containing it.
pub fn datatype_from_path(path: &Path) -> Option<String> {
    let parent = path.parent()?.file_name()?.to_str()?;
    if DATATYPE_LABELS.contains(&parent) {
        Some(parent.to_string())
    } else {
        None
    }
}
