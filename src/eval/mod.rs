//! Query evaluation over an indexed catalog.
//!
//! This module executes parsed queries:
//!
//! - Predicate filtering with the typed comparison ladder
//! - Projection, including `SELECT *` attribute rows
//! - GROUP BY partitioning with auto-aggregation
//! - Aggregate functions (COUNT, AVG, MAX, MIN, SUM, ARRAY_AGG)
//! - HAVING, projection-level DISTINCT, stable ORDER BY
//!
//! Evaluation is a pure function of (catalog, AST): it performs no I/O and
//! holds no interior mutability on catalog objects, so independent
//! evaluations against one catalog are safe from multiple threads.

mod compare;
mod executor;
mod group;

pub use executor::{execute, ResultSet, Row};

#[cfg(test)]
mod tests;
