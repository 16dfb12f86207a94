//! Query execution over a catalog.
//!
//! The pipeline is: predicate filter over records, projection (per record,
//! or per partition when grouping), projection-level DISTINCT, then a
//! stable multi-key ORDER BY. Matched file paths are captured pre-grouping
//! for the `paths` output format. Evaluation never mutates the catalog and
//! performs no I/O.

use crate::ast::{Expr, Operand, OrderKey, Projection, Query, SelectKind};
use crate::error::BiqlError;
use crate::eval::compare;
use crate::eval::group;
use crate::index::{CancelToken, Catalog};
use crate::model::{FileRecord, Value};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;

/// One projected output row: column name to value, in projection order.
pub type Row = IndexMap<String, Value>;

/// The materialized result of a query.
#[derive(Debug)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// File paths of the matching records, in catalog order (pre-grouping).
    pub matched_paths: Vec<String>,
    /// Per-comparison evaluation warnings (bad regex, aggregate misuse).
    pub warnings: Vec<String>,
}

/// Execute a parsed query against a catalog.
pub fn execute(
    catalog: &Catalog,
    query: &Query,
    cancel: &CancelToken,
) -> Result<ResultSet, BiqlError> {
    let mut warnings = Vec::new();

    // Filter stage; cancellation is checked between records.
    let mut matched: Vec<&FileRecord> = Vec::new();
    for record in catalog.records() {
        if cancel.is_cancelled() {
            warnings.push("evaluation cancelled".to_string());
            break;
        }
        let keep = match query.where_clause {
            Some(ref expr) => eval_predicate(record, expr, &mut warnings),
            None => true,
        };
        if keep {
            matched.push(record);
        }
    }
    let matched_paths: Vec<String> = matched.iter().map(|r| r.filepath.clone()).collect();

    let wants_grouping = query.group_by.is_some()
        || query.having.is_some()
        || projection_has_aggregate(query.select.as_ref());

    let mut rows: Vec<SortableRow> = if wants_grouping {
        let group_by = query.group_by.clone().unwrap_or_default();
        group::execute_grouped(
            &matched,
            &group_by,
            query.select.as_ref(),
            query.having.as_ref(),
            cancel,
            &mut warnings,
        )
        .into_iter()
        .map(|values| SortableRow {
            values,
            record: None,
        })
        .collect()
    } else {
        matched
            .iter()
            .map(|&record| SortableRow {
                values: project_record(record, query.select.as_ref()),
                record: Some(record),
            })
            .collect()
    };

    if let Some(ref projection) = query.select {
        if projection.distinct {
            rows = dedupe_rows(rows);
        }
    }

    if let Some(ref order) = query.order_by {
        sort_rows(&mut rows, order);
    }

    Ok(ResultSet {
        rows: rows.into_iter().map(|r| r.values).collect(),
        matched_paths,
        warnings,
    })
}

struct SortableRow<'a> {
    values: Row,
    /// Backing record for ungrouped rows, so ORDER BY can reference fields
    /// outside the projection.
    record: Option<&'a FileRecord>,
}

fn projection_has_aggregate(projection: Option<&Projection>) -> bool {
    projection
        .map(|p| {
            p.items
                .iter()
                .any(|item| matches!(item.kind, SelectKind::Aggregate(_)))
        })
        .unwrap_or(false)
}

/// Evaluate a predicate against one record, with collapsed three-valued
/// logic: null in boolean position is false.
pub(crate) fn eval_predicate(
    record: &FileRecord,
    expr: &Expr,
    warnings: &mut Vec<String>,
) -> bool {
    match expr {
        Expr::Or(left, right) => {
            eval_predicate(record, left, warnings) || eval_predicate(record, right, warnings)
        }
        Expr::And(left, right) => {
            eval_predicate(record, left, warnings) && eval_predicate(record, right, warnings)
        }
        Expr::Not(inner) => !eval_predicate(record, inner, warnings),
        Expr::Compare { left, op, right } => {
            let value = resolve_operand(record, left, warnings);
            compare::evaluate(&value, *op, right, warnings)
        }
        Expr::In { left, values } => {
            let value = resolve_operand(record, left, warnings);
            values
                .iter()
                .any(|v| compare::evaluate(&value, crate::ast::CompareOp::Eq, v, warnings))
        }
        Expr::Like { left, pattern } => {
            let value = resolve_operand(record, left, warnings);
            compare::like_match(pattern, &value, warnings)
        }
        Expr::Exists(operand) => resolve_operand(record, operand, warnings).is_truthy(),
    }
}

fn resolve_operand(record: &FileRecord, operand: &Operand, warnings: &mut Vec<String>) -> Value {
    match operand {
        Operand::Field(path) => record.lookup(path.segments()),
        Operand::Aggregate(call) => {
            warnings.push(format!(
                "aggregate {} used outside HAVING/GROUP BY context",
                call.func.column_name()
            ));
            Value::Null
        }
    }
}

/// Per-record projection (no grouping). A missing or `*` projection emits
/// the whole record as a flat attribute row.
fn project_record(record: &FileRecord, projection: Option<&Projection>) -> Row {
    let Some(projection) = projection else {
        return record_to_row(record);
    };
    let mut row = Row::new();
    for item in &projection.items {
        match &item.kind {
            SelectKind::Wildcard => {
                for (key, value) in record_to_row(record) {
                    row.entry(key).or_insert(value);
                }
            }
            SelectKind::Field(path) => {
                row.insert(item.column_name(), record.lookup(path.segments()));
            }
            // Aggregates route through the grouped pipeline; never reached.
            SelectKind::Aggregate(_) => {}
        }
    }
    row
}

/// Flat row form of a record: computed fields, then entities, then the
/// metadata/participants namespaces when present.
fn record_to_row(record: &FileRecord) -> Row {
    let mut row = Row::new();
    row.insert("filename".to_string(), Value::Str(record.filename.clone()));
    row.insert("filepath".to_string(), Value::Str(record.filepath.clone()));
    row.insert(
        "relative_path".to_string(),
        Value::Str(record.relative_path.clone()),
    );
    row.insert(
        "extension".to_string(),
        Value::Str(record.extension.clone()),
    );
    row.insert(
        "suffix".to_string(),
        record
            .suffix
            .as_ref()
            .map(|s| Value::Str(s.clone()))
            .unwrap_or(Value::Null),
    );
    row.insert(
        "datatype".to_string(),
        record
            .datatype
            .as_ref()
            .map(|s| Value::Str(s.clone()))
            .unwrap_or(Value::Null),
    );
    for (key, value) in &record.entities {
        row.entry(key.clone())
            .or_insert_with(|| Value::Str(value.clone()));
    }
    if !record.metadata.is_empty() {
        row.insert("metadata".to_string(), Value::Map(record.metadata.clone()));
    }
    if !record.participants.is_empty() {
        row.insert(
            "participants".to_string(),
            Value::Map(record.participants.clone()),
        );
    }
    row
}

/// Projection-level DISTINCT: dedupe on the full projected tuple, keeping
/// first occurrences.
fn dedupe_rows(rows: Vec<SortableRow<'_>>) -> Vec<SortableRow<'_>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let key = row_key(&row.values);
        if seen.insert(key) {
            out.push(row);
        }
    }
    out
}

fn row_key(row: &Row) -> String {
    let mut key = String::new();
    for (name, value) in row {
        key.push_str(name);
        key.push('\u{1}');
        key.push_str(&value.partition_key());
        key.push('\u{2}');
    }
    key
}

/// Stable multi-key sort. Nulls sort last ascending, first descending.
fn sort_rows(rows: &mut [SortableRow<'_>], order: &[OrderKey]) {
    rows.sort_by(|a, b| {
        for key in order {
            let left = sort_key_value(a, key);
            let right = sort_key_value(b, key);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if key.descending {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, true) => {
                    if key.descending {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, false) => {
                    let base = compare::order_values(&left, &right);
                    if key.descending {
                        base.reverse()
                    } else {
                        base
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// A sort key resolves against the projected row first (aliases and
/// aggregate columns included), then against the backing record.
fn sort_key_value(row: &SortableRow<'_>, key: &OrderKey) -> Value {
    if let Some(value) = row.values.get(&key.field.to_string()) {
        return value.clone();
    }
    match row.record {
        Some(record) => record.lookup(key.field.segments()),
        None => Value::Null,
    }
}
