use crate::ast::Query;
use crate::error::BiqlError;
use crate::eval::{execute, ResultSet};
use crate::filename::{datatype_from_path, parse_filename};
use crate::index::{CancelToken, Catalog};
use crate::model::{FileRecord, Value};
use crate::parser::parse;
use indexmap::IndexMap;
use std::path::Path;

/// Build a record the way the indexer would, from a root-relative path.
fn record(rel: &str) -> FileRecord {
    let root = Path::new("/ds");
    let path = root.join(rel);
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let parsed = parse_filename(&filename);
    let index_file = parsed.extension == ".json"
        || filename == "participants.tsv"
        || filename.ends_with("_scans.tsv")
        || filename.ends_with("_sessions.tsv");
    let datatype = if index_file {
        None
    } else {
        datatype_from_path(&path)
    };
    FileRecord {
        filepath: path.to_string_lossy().to_string(),
        relative_path: rel.to_string(),
        filename,
        extension: parsed.extension.clone(),
        entities: parsed.entities,
        suffix: parsed.suffix,
        datatype,
        metadata: IndexMap::new(),
        participants: IndexMap::new(),
    }
}

/// The seed dataset: subjects 01..05, sessions 01/02, nback runs 01/02,
/// rest, per-session T1w and scans, stroop beh in ses-01 only, one
/// sessions.tsv per subject. 12 files per subject, sorted walk order.
fn seed_catalog() -> Catalog {
    let mut records = Vec::new();
    for sub in ["01", "02", "03", "04", "05"] {
        for ses in ["01", "02"] {
            records.push(record(&format!(
                "sub-{sub}/ses-{ses}/anat/sub-{sub}_ses-{ses}_T1w.nii.gz"
            )));
            if ses == "01" {
                records.push(record(&format!(
                    "sub-{sub}/ses-01/beh/sub-{sub}_ses-01_task-stroop_beh.tsv"
                )));
            }
            records.push(record(&format!(
                "sub-{sub}/ses-{ses}/func/sub-{sub}_ses-{ses}_task-nback_run-01_bold.nii.gz"
            )));
            records.push(record(&format!(
                "sub-{sub}/ses-{ses}/func/sub-{sub}_ses-{ses}_task-nback_run-02_bold.nii.gz"
            )));
            records.push(record(&format!(
                "sub-{sub}/ses-{ses}/func/sub-{sub}_ses-{ses}_task-rest_bold.nii.gz"
            )));
            records.push(record(&format!(
                "sub-{sub}/ses-{ses}/sub-{sub}_ses-{ses}_scans.tsv"
            )));
        }
        records.push(record(&format!("sub-{sub}/sub-{sub}_sessions.tsv")));
    }
    Catalog::from_records(records)
}

fn run(catalog: &Catalog, source: &str) -> ResultSet {
    let query: Query = parse(source).expect("parse");
    execute(catalog, &query, &CancelToken::new()).expect("execute")
}

fn str_value(s: &str) -> Value {
    Value::Str(s.to_string())
}

#[test]
fn test_no_where_no_group_is_one_row_per_record() {
    let catalog = seed_catalog();
    let result = run(&catalog, "");
    assert_eq!(result.rows.len(), catalog.len());
    assert_eq!(result.matched_paths.len(), catalog.len());
}

#[test]
fn test_single_subject_matches_twelve_records() {
    let catalog = seed_catalog();
    let result = run(&catalog, "sub=01");
    assert_eq!(result.rows.len(), 12);
}

#[test]
fn test_leading_zero_equivalence() {
    let catalog = seed_catalog();
    let padded = run(&catalog, "sub=01");
    let bare = run(&catalog, "sub=1");
    let quoted = run(&catalog, "sub=\"01\"");
    assert_eq!(padded.matched_paths, bare.matched_paths);
    assert_eq!(padded.matched_paths, quoted.matched_paths);
}

#[test]
fn test_select_distinct_task_over_func() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT DISTINCT task WHERE datatype=func");
    let tasks: Vec<Value> = result
        .rows
        .iter()
        .map(|row| row.get("task").cloned().unwrap())
        .collect();
    assert_eq!(tasks, vec![str_value("nback"), str_value("rest")]);
}

#[test]
fn test_count_star_grouped_by_subject() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT sub, COUNT(*) GROUP BY sub");
    assert_eq!(result.rows.len(), 5);
    for row in &result.rows {
        assert_eq!(row.get("count"), Some(&Value::Int(12)));
    }
}

#[test]
fn test_group_by_task_includes_null_bucket() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT task, COUNT(*) GROUP BY task");
    // nback, rest, stroop, plus the null bucket.
    assert_eq!(result.rows.len(), 4);
    let count_for = |task: &Value| {
        result
            .rows
            .iter()
            .find(|row| row.get("task") == Some(task))
            .and_then(|row| row.get("count").cloned())
    };
    assert_eq!(count_for(&str_value("nback")), Some(Value::Int(20)));
    assert_eq!(count_for(&str_value("rest")), Some(Value::Int(10)));
    assert_eq!(count_for(&str_value("stroop")), Some(Value::Int(5)));
    // T1w (10) + scans (10) + sessions (5) have no task entity.
    assert_eq!(count_for(&Value::Null), Some(Value::Int(25)));
}

#[test]
fn test_array_agg_distinct_tasks_first_seen_order() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT sub, ARRAY_AGG(DISTINCT task) AS tasks WHERE sub IN [01, 02, 03] GROUP BY sub",
    );
    assert_eq!(result.rows.len(), 3);
    for row in &result.rows {
        // Walk order visits beh/ before func/, so stroop is seen first.
        assert_eq!(
            row.get("tasks"),
            Some(&Value::List(vec![
                str_value("stroop"),
                str_value("nback"),
                str_value("rest"),
            ]))
        );
    }
}

#[test]
fn test_array_agg_preserves_nulls_without_distinct() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT ARRAY_AGG(task) AS tasks WHERE sub=01 GROUP BY sub");
    let Some(Value::List(tasks)) = result.rows[0].get("tasks") else {
        panic!("expected list");
    };
    assert_eq!(tasks.len(), 12);
    assert_eq!(tasks.iter().filter(|v| v.is_null()).count(), 5);
}

#[test]
fn test_array_agg_with_conditional_filter() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT sub, ARRAY_AGG(DISTINCT task WHERE datatype=func) AS tasks WHERE sub=01 GROUP BY sub",
    );
    assert_eq!(
        result.rows[0].get("tasks"),
        Some(&Value::List(vec![str_value("nback"), str_value("rest")]))
    );
}

#[test]
fn test_regex_and_glob_select_same_records() {
    let catalog = seed_catalog();
    let regex = run(&catalog, "task ~= \".*back.*\"");
    let glob = run(&catalog, "task=*back*");
    assert_eq!(regex.rows.len(), 20);
    assert_eq!(regex.matched_paths, glob.matched_paths);
}

#[test]
fn test_regex_literal_slash_form() {
    let catalog = seed_catalog();
    let result = run(&catalog, "task ~= /nback/");
    assert_eq!(result.rows.len(), 20);
}

#[test]
fn test_participants_namespace_filter() {
    let mut records = Vec::new();
    for (sub, age) in [("01", 23), ("02", 31), ("03", 27)] {
        let mut rec = record(&format!("sub-{sub}/anat/sub-{sub}_T1w.nii.gz"));
        rec.participants
            .insert("age".to_string(), Value::Int(age));
        records.push(rec);
    }
    let catalog = Catalog::from_records(records);

    let result = run(&catalog, "participants.age > 25");
    let subs: Vec<Value> = result
        .rows
        .iter()
        .map(|row| row.get("sub").cloned().unwrap())
        .collect();
    assert_eq!(subs, vec![str_value("02"), str_value("03")]);
}

#[test]
fn test_having_filters_partitions() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT sub, ses, task, COUNT(*) AS n_runs \
         WHERE datatype=func AND task != rest \
         GROUP BY sub, ses, task HAVING COUNT(*) > 1",
    );
    // (sub, ses, nback) for 5 subjects x 2 sessions.
    assert_eq!(result.rows.len(), 10);
    for row in &result.rows {
        assert_eq!(row.get("task"), Some(&str_value("nback")));
        assert_eq!(row.get("n_runs"), Some(&Value::Int(2)));
    }
}

#[test]
fn test_auto_aggregation_rules() {
    let catalog = seed_catalog();

    // Several distinct values -> first-seen list.
    let result = run(&catalog, "SELECT sub, ses WHERE datatype=anat GROUP BY sub");
    assert_eq!(
        result.rows[0].get("ses"),
        Some(&Value::List(vec![str_value("01"), str_value("02")]))
    );

    // Exactly one distinct value -> scalar.
    let result = run(&catalog, "SELECT sub, suffix WHERE datatype=anat GROUP BY sub");
    assert_eq!(result.rows[0].get("suffix"), Some(&str_value("T1w")));

    // All null -> null.
    let result = run(&catalog, "SELECT sub, task WHERE datatype=anat GROUP BY sub");
    assert_eq!(result.rows[0].get("task"), Some(&Value::Null));
}

#[test]
fn test_single_row_partition_auto_aggregate_equals_record_value() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT run, task WHERE sub=01 ses=01 task=nback run=01 GROUP BY run",
    );
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("task"), Some(&str_value("nback")));
}

#[test]
fn test_projection_distinct_is_idempotent() {
    let catalog = seed_catalog();
    let once = run(&catalog, "SELECT DISTINCT datatype");
    let rows: Vec<_> = once.rows.clone();
    // Re-running the same DISTINCT projection changes nothing.
    let again = run(&catalog, "SELECT DISTINCT datatype");
    assert_eq!(rows, again.rows);
    assert_eq!(once.rows.len(), 4); // anat, beh, func, null
}

#[test]
fn test_order_by_nulls_last_ascending_first_descending() {
    let catalog = seed_catalog();
    let asc = run(&catalog, "SELECT DISTINCT task ORDER BY task ASC");
    assert_eq!(asc.rows.last().unwrap().get("task"), Some(&Value::Null));
    let desc = run(&catalog, "SELECT DISTINCT task ORDER BY task DESC");
    assert_eq!(desc.rows.first().unwrap().get("task"), Some(&Value::Null));
    let tasks: Vec<Value> = desc
        .rows
        .iter()
        .skip(1)
        .map(|row| row.get("task").cloned().unwrap())
        .collect();
    assert_eq!(
        tasks,
        vec![str_value("stroop"), str_value("rest"), str_value("nback")]
    );
}

#[test]
fn test_order_by_is_stable_across_runs() {
    let catalog = seed_catalog();
    let first = run(&catalog, "SELECT filename, sub ORDER BY sub");
    let second = run(&catalog, "SELECT filename, sub ORDER BY sub");
    assert_eq!(first.rows, second.rows);
}

#[test]
fn test_order_by_field_outside_projection() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT filename WHERE task=nback sub=01 ORDER BY run DESC");
    let first = result.rows[0].get("filename").unwrap().as_display_string();
    assert!(first.contains("run-02"));
}

#[test]
fn test_range_and_in_list() {
    let catalog = seed_catalog();
    assert_eq!(run(&catalog, "run=[1:2]").rows.len(), 20);
    assert_eq!(run(&catalog, "run=[2:3]").rows.len(), 10);
    assert_eq!(run(&catalog, "sub IN [01, 03]").rows.len(), 24);
}

#[test]
fn test_like_patterns() {
    let catalog = seed_catalog();
    assert_eq!(run(&catalog, "task LIKE \"%back%\"").rows.len(), 20);
    assert_eq!(run(&catalog, "suffix LIKE \"T_w\"").rows.len(), 10);
}

#[test]
fn test_existence_probe() {
    let catalog = seed_catalog();
    assert_eq!(run(&catalog, "task").rows.len(), 35);
    assert_eq!(run(&catalog, "NOT task").rows.len(), 25);
}

#[test]
fn test_count_field_skips_nulls() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT sub, COUNT(task) AS n WHERE sub=01 GROUP BY sub");
    assert_eq!(result.rows[0].get("n"), Some(&Value::Int(7)));
    let result = run(
        &catalog,
        "SELECT sub, COUNT(DISTINCT task) AS n WHERE sub=01 GROUP BY sub",
    );
    assert_eq!(result.rows[0].get("n"), Some(&Value::Int(3)));
}

#[test]
fn test_numeric_aggregates_over_entity_strings() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT AVG(run) AS avg_run, SUM(run) AS total, MAX(run) AS hi, MIN(run) AS lo \
         WHERE sub=01 ses=01 task=nback GROUP BY task",
    );
    let row = &result.rows[0];
    assert_eq!(row.get("avg_run"), Some(&Value::Float(1.5)));
    assert_eq!(row.get("total"), Some(&Value::Int(3)));
    assert_eq!(row.get("hi"), Some(&str_value("02")));
    assert_eq!(row.get("lo"), Some(&str_value("01")));
}

#[test]
fn test_max_falls_back_to_lexicographic() {
    let catalog = seed_catalog();
    let result = run(
        &catalog,
        "SELECT MAX(task) AS last WHERE datatype=func GROUP BY datatype",
    );
    assert_eq!(result.rows[0].get("last"), Some(&str_value("rest")));
}

#[test]
fn test_avg_of_non_numeric_is_null() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT AVG(task) AS x WHERE datatype=func GROUP BY datatype");
    assert_eq!(result.rows[0].get("x"), Some(&Value::Null));
}

#[test]
fn test_metadata_namespace_comparisons() {
    let mut rec_a = record("sub-01/func/sub-01_task-rest_bold.nii.gz");
    rec_a
        .metadata
        .insert("EchoTime".to_string(), Value::Float(0.03));
    let mut inner = IndexMap::new();
    inner.insert("Name".to_string(), str_value("Siemens"));
    rec_a
        .metadata
        .insert("Manufacturer".to_string(), Value::Map(inner));

    let mut rec_b = record("sub-02/func/sub-02_task-rest_bold.nii.gz");
    rec_b
        .metadata
        .insert("EchoTime".to_string(), Value::Float(0.05));

    let catalog = Catalog::from_records(vec![rec_a, rec_b]);
    assert_eq!(run(&catalog, "metadata.EchoTime < 0.04").rows.len(), 1);
    assert_eq!(
        run(&catalog, "metadata.Manufacturer.Name = Siemens").rows.len(),
        1
    );
    assert_eq!(run(&catalog, "metadata.Missing").rows.len(), 0);
}

#[test]
fn test_bad_regex_localized_to_comparison() {
    let catalog = seed_catalog();
    let result = run(&catalog, "task ~= \"(unclosed\" OR task=rest");
    // The broken comparison is false; the OR arm still matches.
    assert_eq!(result.rows.len(), 10);
    assert!(result.warnings.iter().any(|w| w.contains("invalid regex")));
}

#[test]
fn test_aggregate_in_where_warns_and_matches_nothing() {
    let catalog = seed_catalog();
    let result = run(&catalog, "COUNT(*) > 3");
    assert!(result.rows.is_empty());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("outside HAVING")));
}

#[test]
fn test_implicit_single_partition_for_bare_aggregate() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT COUNT(*)");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].get("count"), Some(&Value::Int(60)));
}

#[test]
fn test_group_by_session_has_three_buckets() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT ses, COUNT(*) GROUP BY ses");
    assert_eq!(result.rows.len(), 3);
    let null_row = result
        .rows
        .iter()
        .find(|row| row.get("ses") == Some(&Value::Null))
        .expect("null session bucket");
    // One sessions.tsv per subject carries no ses entity.
    assert_eq!(null_row.get("count"), Some(&Value::Int(5)));
}

#[test]
fn test_matched_paths_are_pre_grouping() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT sub, COUNT(*) WHERE datatype=func GROUP BY sub");
    assert_eq!(result.rows.len(), 5);
    assert_eq!(result.matched_paths.len(), 30);
}

#[test]
fn test_cancelled_evaluation_stops_early() {
    let catalog = seed_catalog();
    let cancel = CancelToken::new();
    cancel.cancel();
    let query = parse("sub=01").expect("parse");
    let result = execute(&catalog, &query, &cancel).expect("execute");
    assert!(result.rows.is_empty());
    assert!(result.warnings.iter().any(|w| w.contains("cancelled")));
}

#[test]
fn test_select_star_rows_carry_entities_and_computed_fields() {
    let catalog = seed_catalog();
    let result = run(&catalog, "SELECT * WHERE sub=01 ses=01 task=rest");
    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.get("task"), Some(&str_value("rest")));
    assert_eq!(row.get("datatype"), Some(&str_value("func")));
    assert_eq!(row.get("suffix"), Some(&str_value("bold")));
    assert!(row.get("filename").is_some());
}

#[test]
fn test_format_clause_is_parsed_not_evaluated() {
    let query = parse("sub=01 FORMAT table").expect("parse");
    assert_eq!(query.format.as_deref(), Some("table"));
    let catalog = seed_catalog();
    let result = execute(&catalog, &query, &CancelToken::new()).expect("execute");
    assert_eq!(result.rows.len(), 12);
}

#[test]
fn test_unknown_namespace_resolves_null() {
    let catalog = seed_catalog();
    assert_eq!(run(&catalog, "nosuch.field").rows.len(), 0);
}

#[test]
fn test_error_surface_is_syntax_only() {
    let err = parse("SELECT COUNT(DISTINCT *)").expect_err("parse must fail");
    assert!(matches!(err, BiqlError::Syntax { .. }));
}
