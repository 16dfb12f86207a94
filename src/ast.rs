//! Abstract syntax tree for BIQL queries.
//!
//! Queries, expressions, and right-hand values are plain sum types; the
//! evaluator is a fold over them. All types serialize so `--debug` can dump
//! the parsed tree.

use serde::Serialize;
use std::fmt;

/// A dotted field reference (`sub`, `metadata.EchoTime`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn bare(name: &str) -> FieldPath {
        FieldPath(vec![name.to_string()])
    }

    pub fn from_dotted(raw: &str) -> FieldPath {
        FieldPath(raw.split('.').map(|s| s.to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A parsed query. A missing SELECT means `SELECT *`; a bare predicate
/// query is `SELECT * WHERE expr`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Query {
    pub select: Option<Projection>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<Vec<FieldPath>>,
    pub having: Option<Expr>,
    pub order_by: Option<Vec<OrderKey>>,
    /// `FORMAT ident` clause, validated by the output layer.
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectItem {
    pub kind: SelectKind,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Output column name: the alias when given, otherwise a name derived
    /// from the item itself.
    pub fn column_name(&self) -> String {
        if let Some(ref alias) = self.alias {
            return alias.clone();
        }
        match &self.kind {
            SelectKind::Wildcard => "*".to_string(),
            SelectKind::Field(path) => path.to_string(),
            SelectKind::Aggregate(call) => call.func.column_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SelectKind {
    /// `*`: every namespace of the record.
    Wildcard,
    Field(FieldPath),
    Aggregate(AggregateCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateFunc {
    Count,
    Avg,
    Max,
    Min,
    Sum,
    ArrayAgg,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<AggregateFunc> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "AVG" => Some(AggregateFunc::Avg),
            "MAX" => Some(AggregateFunc::Max),
            "MIN" => Some(AggregateFunc::Min),
            "SUM" => Some(AggregateFunc::Sum),
            "ARRAY_AGG" => Some(AggregateFunc::ArrayAgg),
            _ => None,
        }
    }

    pub const fn column_name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Max => "max",
            AggregateFunc::Min => "min",
            AggregateFunc::Sum => "sum",
            AggregateFunc::ArrayAgg => "array_agg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AggregateArg {
    /// `COUNT(*)`
    Star,
    Field(FieldPath),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    pub distinct: bool,
    pub arg: AggregateArg,
    /// `ARRAY_AGG(expr WHERE cond)` conditional filter.
    pub filter: Option<Box<Expr>>,
}

/// Left side of a comparison: a field, or an aggregate (meaningful in
/// HAVING, where it is evaluated over the partition).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    Field(FieldPath),
    Aggregate(AggregateCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `~=`: full-match regex.
    Match,
}

/// Right-hand value forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RValue {
    Number(f64),
    Str(String),
    /// Unquoted `*`/`?` glob pattern.
    Pattern(String),
    /// `/.../` literal or the string right of `~=`.
    Regex(String),
    Null,
    /// `[lo:hi]` inclusive numeric range.
    Range(f64, f64),
    List(Vec<RValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: RValue,
    },
    In {
        left: Operand,
        values: Vec<RValue>,
    },
    Like {
        left: Operand,
        pattern: String,
    },
    /// Bare operand used as a predicate: non-null and non-empty.
    Exists(Operand),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderKey {
    pub field: FieldPath,
    pub descending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_display() {
        assert_eq!(
            FieldPath::from_dotted("metadata.Manufacturer.Name").to_string(),
            "metadata.Manufacturer.Name"
        );
        assert_eq!(FieldPath::bare("sub").to_string(), "sub");
    }

    #[test]
    fn test_aggregate_names_round_trip() {
        for name in ["count", "avg", "max", "min", "sum", "array_agg"] {
            let func = AggregateFunc::from_name(name).expect("known aggregate");
            assert_eq!(func.column_name(), name);
        }
        assert_eq!(AggregateFunc::from_name("ARRAY_AGG"), Some(AggregateFunc::ArrayAgg));
        assert_eq!(AggregateFunc::from_name("median"), None);
    }

    #[test]
    fn test_column_name_prefers_alias() {
        let item = SelectItem {
            kind: SelectKind::Aggregate(AggregateCall {
                func: AggregateFunc::Count,
                distinct: false,
                arg: AggregateArg::Star,
                filter: None,
            }),
            alias: Some("n_runs".to_string()),
        };
        assert_eq!(item.column_name(), "n_runs");
    }
}
