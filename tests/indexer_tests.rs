//! Integration tests for dataset indexing: the walk, filename round-trips,
//! sidecar inheritance, and the participants join, all over real on-disk
//! fixtures.

use biql::filename::parse_filename;
use biql::{BiqlError, CancelToken, Engine, Value};
use std::fs;
use std::path::Path;

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

/// A small dataset exercising inheritance: a dataset-level sidecar, a
/// file-specific override, participants, and one broken sidecar.
fn inheritance_dataset() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();

    write_file(
        &root.join("dataset_description.json"),
        r#"{"Name": "Test dataset", "BIDSVersion": "1.8.0"}"#,
    );
    write_file(
        &root.join("task-rest_bold.json"),
        r#"{"RepetitionTime": 2.0, "EchoTime": 0.03}"#,
    );
    write_file(
        &root.join("participants.tsv"),
        "participant_id\tage\tsex\nsub-01\t34\tF\nsub-02\t28\tM\n",
    );
    write_file(
        &root.join("sub-01/func/sub-01_task-rest_bold.nii.gz"),
        "data",
    );
    write_file(
        &root.join("sub-01/func/sub-01_task-rest_bold.json"),
        r#"{"RepetitionTime": 1.5}"#,
    );
    write_file(&root.join("sub-01/anat/sub-01_T1w.nii.gz"), "data");
    write_file(
        &root.join("sub-02/func/sub-02_task-rest_bold.nii.gz"),
        "data",
    );
    write_file(&root.join("sub-02/broken.json"), "{not valid json");

    dir
}

#[test]
fn test_every_regular_file_is_indexed() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    // 8 files written above.
    assert_eq!(engine.dataset_stats().total_files, 8);
}

#[test]
fn test_filename_reparse_reproduces_record_fields() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    for record in engine.catalog().records() {
        let reparsed = parse_filename(&record.filename);
        assert_eq!(reparsed.entities, record.entities, "{}", record.filename);
        assert_eq!(reparsed.suffix, record.suffix, "{}", record.filename);
        assert_eq!(reparsed.extension, record.extension, "{}", record.filename);
    }
}

#[test]
fn test_relative_path_is_suffix_of_filepath() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    for record in engine.catalog().records() {
        assert!(
            record.filepath.ends_with(&record.relative_path),
            "{} / {}",
            record.filepath,
            record.relative_path
        );
    }
}

#[test]
fn test_nearest_ancestor_metadata_override() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");

    let sub01 = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-01_task-rest_bold.nii.gz")
        .expect("sub-01 bold record");
    // File-level sidecar overrides the dataset-level value; untouched keys
    // inherit.
    assert_eq!(
        sub01.metadata.get("RepetitionTime"),
        Some(&Value::Float(1.5))
    );
    assert_eq!(sub01.metadata.get("EchoTime"), Some(&Value::Float(0.03)));

    let sub02 = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-02_task-rest_bold.nii.gz")
        .expect("sub-02 bold record");
    assert_eq!(
        sub02.metadata.get("RepetitionTime"),
        Some(&Value::Float(2.0))
    );
}

#[test]
fn test_sidecar_does_not_leak_to_other_suffixes() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    let t1w = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-01_T1w.nii.gz")
        .expect("T1w record");
    assert!(t1w.metadata.is_empty());
}

#[test]
fn test_participants_joined_by_subject() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    let record = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-01_T1w.nii.gz")
        .expect("record");
    assert_eq!(record.participants.get("age"), Some(&Value::Int(34)));
    assert_eq!(
        record.participants.get("sex"),
        Some(&Value::Str("F".to_string()))
    );

    // Files with no sub entity carry no participants row.
    let description = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "dataset_description.json")
        .expect("record");
    assert!(description.participants.is_empty());
}

#[test]
fn test_broken_sidecar_warns_but_is_still_indexed() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    assert!(engine
        .warnings()
        .iter()
        .any(|w| w.contains("broken.json")));
    assert!(engine
        .catalog()
        .records()
        .iter()
        .any(|r| r.filename == "broken.json"));
    // The other sidecars still contributed.
    let sub02 = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-02_task-rest_bold.nii.gz")
        .expect("record");
    assert!(!sub02.metadata.is_empty());
}

#[test]
fn test_index_files_have_no_datatype() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    for record in engine.catalog().records() {
        if record.extension == ".json" || record.filename == "participants.tsv" {
            assert_eq!(record.datatype, None, "{}", record.filename);
        }
    }
    let bold = engine
        .catalog()
        .records()
        .iter()
        .find(|r| r.filename == "sub-01_task-rest_bold.nii.gz")
        .expect("record");
    assert_eq!(bold.datatype.as_deref(), Some("func"));
}

#[test]
fn test_dataset_stats_shape() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    let stats = engine.dataset_stats();
    assert_eq!(stats.total_subjects, 2);
    assert_eq!(stats.subjects, vec!["01".to_string(), "02".to_string()]);
    assert_eq!(
        stats.datatypes,
        vec!["anat".to_string(), "func".to_string()]
    );
    assert_eq!(stats.files_by_datatype.get("func"), Some(&2));
    assert_eq!(stats.files_by_datatype.get("anat"), Some(&1));
}

#[test]
fn test_catalog_order_is_stable_across_rebuilds() {
    let dir = inheritance_dataset();
    let first: Vec<String> = Engine::build(dir.path())
        .expect("build")
        .catalog()
        .records()
        .iter()
        .map(|r| r.relative_path.clone())
        .collect();
    let second: Vec<String> = Engine::build(dir.path())
        .expect("build")
        .catalog()
        .records()
        .iter()
        .map(|r| r.relative_path.clone())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_missing_root_fails_with_dataset_error() {
    let err = Engine::build(Path::new("/no/such/dataset")).expect_err("must fail");
    assert!(matches!(err, BiqlError::DatasetNotFound { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_root_that_is_a_file_is_unreadable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("not-a-dir");
    fs::write(&file, "x").expect("write");
    let err = Engine::build(&file).expect_err("must fail");
    assert!(matches!(err, BiqlError::DatasetUnreadable { .. }));
}

#[test]
fn test_cancelled_build_stops_early() {
    let dir = inheritance_dataset();
    let cancel = CancelToken::new();
    cancel.cancel();
    let engine = Engine::build_with_cancel(dir.path(), &cancel).expect("build");
    assert_eq!(engine.catalog().len(), 0);
    assert!(engine.warnings().iter().any(|w| w.contains("cancelled")));
}

#[cfg(unix)]
#[test]
fn test_symlinked_file_is_followed_once() {
    let dir = inheritance_dataset();
    let target = dir.path().join("sub-01/anat/sub-01_T1w.nii.gz");
    let link = dir.path().join("sub-01/anat/zz-link.nii.gz");
    std::os::unix::fs::symlink(&target, &link).expect("symlink");

    let engine = Engine::build(dir.path()).expect("build");
    let visits = engine
        .catalog()
        .records()
        .iter()
        .filter(|r| r.filepath.ends_with("sub-01_T1w.nii.gz") || r.filename == "zz-link.nii.gz")
        .count();
    assert_eq!(visits, 1);
}

#[test]
fn test_entity_summary_lists_distinct_values() {
    let dir = inheritance_dataset();
    let engine = Engine::build(dir.path()).expect("build");
    let summary = engine.catalog().entity_summary();
    assert_eq!(
        summary.get("sub"),
        Some(&vec!["01".to_string(), "02".to_string()])
    );
    assert_eq!(summary.get("task"), Some(&vec!["rest".to_string()]));
}
