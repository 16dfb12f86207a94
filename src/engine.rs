//! Engine facade: one entry point tying the indexer, parser, evaluator,
//! and formatters together.
//!
//! The engine owns the catalog, which is immutable after `build`; queries
//! borrow it read-only. Build-time warnings (sidecar and participants
//! issues) accumulate on the engine, evaluation warnings travel with each
//! result set.

use crate::ast::Query;
use crate::error::BiqlError;
use crate::eval::{execute, ResultSet};
use crate::index::{build_catalog, CancelToken, Catalog, DatasetStats};
use crate::output::{render, OutputFormat};
use crate::parser;
use log::debug;
use std::path::Path;

#[derive(Debug)]
pub struct Engine {
    catalog: Catalog,
    stats: DatasetStats,
    warnings: Vec<String>,
}

impl Engine {
    /// Index the dataset at `root` and return a ready engine.
    pub fn build(root: &Path) -> Result<Engine, BiqlError> {
        Engine::build_with_cancel(root, &CancelToken::new())
    }

    /// Like [`Engine::build`], honoring a cooperative cancellation token
    /// between files.
    pub fn build_with_cancel(root: &Path, cancel: &CancelToken) -> Result<Engine, BiqlError> {
        let (catalog, warnings) = build_catalog(root, cancel)?;
        let stats = catalog.stats();
        Ok(Engine {
            catalog,
            stats,
            warnings,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn dataset_stats(&self) -> &DatasetStats {
        &self.stats
    }

    /// Build-time warning sink (skipped sidecars, malformed participants
    /// rows). Visible via `--debug` or this inspection API.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Parse a query into its AST (composable form).
    pub fn parse(&self, query_text: &str) -> Result<Query, BiqlError> {
        parser::parse(query_text)
    }

    /// Parse-only check.
    pub fn validate(&self, query_text: &str) -> Result<(), BiqlError> {
        parser::parse(query_text).map(|_| ())
    }

    /// Evaluate a parsed query against the catalog (composable form).
    pub fn evaluate(&self, query: &Query) -> Result<ResultSet, BiqlError> {
        self.evaluate_with_cancel(query, &CancelToken::new())
    }

    pub fn evaluate_with_cancel(
        &self,
        query: &Query,
        cancel: &CancelToken,
    ) -> Result<ResultSet, BiqlError> {
        let result = execute(&self.catalog, query, cancel)?;
        for warning in &result.warnings {
            debug!("evaluation warning: {}", warning);
        }
        Ok(result)
    }

    /// Convenience: parse, evaluate, and render in one call. A `FORMAT`
    /// clause in the query wins over the requested format.
    pub fn run_query(
        &self,
        query_text: &str,
        format: OutputFormat,
    ) -> Result<String, BiqlError> {
        let query = self.parse(query_text)?;
        let format = resolve_format(&query, format)?;
        let result = self.evaluate(&query)?;
        render(&result, format)
    }
}

/// Pick the effective output format: the query's `FORMAT` clause when
/// present, the caller's choice otherwise.
pub fn resolve_format(query: &Query, fallback: OutputFormat) -> Result<OutputFormat, BiqlError> {
    match query.format {
        Some(ref name) => OutputFormat::from_name(name).ok_or_else(|| BiqlError::OutputError {
            reason: format!(
                "unknown output format '{}' (expected json, table, csv, tsv, or paths)",
                name
            ),
        }),
        None => Ok(fallback),
    }
}
