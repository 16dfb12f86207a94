//! GROUP BY partitioning, aggregate functions, and auto-aggregation.
//!
//! Partitions are keyed by the tuple of group-key values; null forms its
//! own bucket. Non-grouped SELECT fields auto-aggregate: exactly one
//! distinct non-null value collapses to a scalar, several become a
//! first-seen-ordered list, all-null becomes null. HAVING runs against the
//! partition after aggregation with the same expression semantics as WHERE.

use crate::ast::{
    AggregateArg, AggregateCall, AggregateFunc, Expr, FieldPath, Operand, Projection, SelectItem,
    SelectKind,
};
use crate::eval::compare;
use crate::eval::executor::{eval_predicate, Row};
use crate::index::CancelToken;
use crate::model::{FileRecord, Value};
use indexmap::IndexMap;
use std::collections::HashSet;

struct Partition<'a> {
    /// Group-key values in `group_by` order.
    keys: Vec<(FieldPath, Value)>,
    records: Vec<&'a FileRecord>,
}

/// Partition the matched records and produce one row per partition.
///
/// With an empty `group_by` (implicit aggregation, e.g. a bare
/// `SELECT COUNT(*)` or HAVING without GROUP BY) every record lands in a
/// single partition.
pub(crate) fn execute_grouped<'a>(
    matched: &[&'a FileRecord],
    group_by: &[FieldPath],
    projection: Option<&Projection>,
    having: Option<&Expr>,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> Vec<Row> {
    let mut partitions: IndexMap<String, Partition<'a>> = IndexMap::new();
    for &record in matched {
        let keys: Vec<(FieldPath, Value)> = group_by
            .iter()
            .map(|path| (path.clone(), record.lookup(path.segments())))
            .collect();
        let bucket = keys
            .iter()
            .map(|(_, v)| v.partition_key())
            .collect::<Vec<_>>()
            .join("\u{1}");
        partitions
            .entry(bucket)
            .or_insert_with(|| Partition {
                keys,
                records: Vec::new(),
            })
            .records
            .push(record);
    }

    let items = effective_items(group_by, projection);

    let mut rows = Vec::new();
    for partition in partitions.values() {
        // Cancellation is checked between partitions during aggregation.
        if cancel.is_cancelled() {
            warnings.push("aggregation cancelled".to_string());
            break;
        }
        if let Some(expr) = having {
            if !eval_grouped(partition, expr, warnings) {
                continue;
            }
        }
        rows.push(project_partition(partition, &items, warnings));
    }
    rows
}

/// The select items a partition row is built from. Without an explicit
/// projection, grouped output is the group keys themselves.
fn effective_items(group_by: &[FieldPath], projection: Option<&Projection>) -> Vec<SelectItem> {
    match projection {
        Some(projection) => projection.items.clone(),
        None => group_by
            .iter()
            .map(|path| SelectItem {
                kind: SelectKind::Field(path.clone()),
                alias: None,
            })
            .collect(),
    }
}

fn project_partition(
    partition: &Partition<'_>,
    items: &[SelectItem],
    warnings: &mut Vec<String>,
) -> Row {
    let mut row = Row::new();
    for item in items {
        match &item.kind {
            SelectKind::Wildcard => {
                // In grouped context `*` contributes the group keys.
                for (path, value) in &partition.keys {
                    row.entry(path.to_string()).or_insert_with(|| value.clone());
                }
            }
            SelectKind::Field(path) => {
                row.insert(item.column_name(), resolve_field(partition, path));
            }
            SelectKind::Aggregate(call) => {
                row.insert(
                    item.column_name(),
                    compute_aggregate(call, &partition.records, warnings),
                );
            }
        }
    }
    row
}

/// A field in a partition row: the group-key value when grouped by it,
/// otherwise its auto-aggregation over the partition.
fn resolve_field(partition: &Partition<'_>, path: &FieldPath) -> Value {
    for (key_path, value) in &partition.keys {
        if key_path == path {
            return value.clone();
        }
    }
    auto_aggregate(path, &partition.records)
}

/// Distinct non-null values across the partition, first-seen order:
/// none -> null, one -> the scalar itself, several -> a list.
fn auto_aggregate(path: &FieldPath, records: &[&FileRecord]) -> Value {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for record in records {
        let value = record.lookup(path.segments());
        if value.is_null() {
            continue;
        }
        if seen.insert(value.partition_key()) {
            distinct.push(value);
        }
    }
    match distinct.len() {
        0 => Value::Null,
        1 => distinct.into_iter().next().unwrap_or(Value::Null),
        _ => Value::List(distinct),
    }
}

/// HAVING / grouped-expression evaluation: aggregates compute over the
/// partition, plain fields resolve like partition-row fields.
fn eval_grouped(partition: &Partition<'_>, expr: &Expr, warnings: &mut Vec<String>) -> bool {
    match expr {
        Expr::Or(left, right) => {
            eval_grouped(partition, left, warnings) || eval_grouped(partition, right, warnings)
        }
        Expr::And(left, right) => {
            eval_grouped(partition, left, warnings) && eval_grouped(partition, right, warnings)
        }
        Expr::Not(inner) => !eval_grouped(partition, inner, warnings),
        Expr::Compare { left, op, right } => {
            let value = resolve_grouped_operand(partition, left, warnings);
            compare::evaluate(&value, *op, right, warnings)
        }
        Expr::In { left, values } => {
            let value = resolve_grouped_operand(partition, left, warnings);
            values
                .iter()
                .any(|v| compare::evaluate(&value, crate::ast::CompareOp::Eq, v, warnings))
        }
        Expr::Like { left, pattern } => {
            let value = resolve_grouped_operand(partition, left, warnings);
            compare::like_match(pattern, &value, warnings)
        }
        Expr::Exists(operand) => {
            resolve_grouped_operand(partition, operand, warnings).is_truthy()
        }
    }
}

fn resolve_grouped_operand(
    partition: &Partition<'_>,
    operand: &Operand,
    warnings: &mut Vec<String>,
) -> Value {
    match operand {
        Operand::Field(path) => resolve_field(partition, path),
        Operand::Aggregate(call) => compute_aggregate(call, &partition.records, warnings),
    }
}

/// Evaluate one aggregate call over a partition's records.
pub(crate) fn compute_aggregate(
    call: &AggregateCall,
    records: &[&FileRecord],
    warnings: &mut Vec<String>,
) -> Value {
    // ARRAY_AGG(expr WHERE cond) and friends: the filter narrows the
    // partition in row context before aggregation.
    let filtered: Vec<&FileRecord> = match call.filter {
        Some(ref cond) => records
            .iter()
            .copied()
            .filter(|record| eval_predicate(record, cond, warnings))
            .collect(),
        None => records.to_vec(),
    };

    let values: Vec<Value> = match &call.arg {
        AggregateArg::Star => {
            // Only COUNT accepts `*`; the parser guarantees it.
            return Value::Int(filtered.len() as i64);
        }
        AggregateArg::Field(path) => filtered
            .iter()
            .map(|record| record.lookup(path.segments()))
            .collect(),
    };

    match call.func {
        AggregateFunc::Count => {
            let non_null = values.iter().filter(|v| !v.is_null());
            if call.distinct {
                let distinct: HashSet<String> = non_null.map(|v| v.partition_key()).collect();
                Value::Int(distinct.len() as i64)
            } else {
                Value::Int(non_null.count() as i64)
            }
        }
        AggregateFunc::Avg | AggregateFunc::Sum => {
            let numbers = numeric_values(&values, call.distinct);
            if numbers.is_empty() {
                return Value::Null;
            }
            let total: f64 = numbers.iter().sum();
            if call.func == AggregateFunc::Avg {
                Value::Float(total / numbers.len() as f64)
            } else if total.fract() == 0.0 {
                Value::Int(total as i64)
            } else {
                Value::Float(total)
            }
        }
        AggregateFunc::Max | AggregateFunc::Min => {
            let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
            if non_null.is_empty() {
                return Value::Null;
            }
            let pick = if call.func == AggregateFunc::Max {
                non_null
                    .iter()
                    .max_by(|a, b| compare::order_values(a, b))
            } else {
                non_null
                    .iter()
                    .min_by(|a, b| compare::order_values(a, b))
            };
            pick.map(|v| (**v).clone()).unwrap_or(Value::Null)
        }
        AggregateFunc::ArrayAgg => {
            if call.distinct {
                // DISTINCT keeps first occurrences and drops nulls.
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for value in values {
                    if value.is_null() {
                        continue;
                    }
                    if seen.insert(value.partition_key()) {
                        out.push(value);
                    }
                }
                Value::List(out)
            } else {
                Value::List(values)
            }
        }
    }
}

/// Numeric, non-null views for AVG/SUM; DISTINCT dedupes before conversion.
fn numeric_values(values: &[Value], distinct: bool) -> Vec<f64> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if value.is_null() {
            continue;
        }
        if distinct && !seen.insert(value.partition_key()) {
            continue;
        }
        if let Some(number) = value.as_number() {
            out.push(number);
        }
    }
    out
}
