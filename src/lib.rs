//! biql - BIDS Query Language.
//!
//! A SQL-like query language over BIDS (Brain Imaging Data Structure)
//! datasets. The engine indexes a dataset directory into an immutable
//! catalog of file records, then runs SELECT/WHERE/GROUP BY queries
//! against it.
//!
//! # Features
//!
//! - **Dataset indexing**: filename entities, inherited JSON sidecar
//!   metadata, participants.tsv joins
//! - **Query language**: optional SELECT/WHERE/GROUP BY/HAVING/ORDER
//!   BY/DISTINCT, wildcards, ranges, lists, regex, metadata paths
//! - **Aggregation**: COUNT, AVG, MAX, MIN, SUM, ARRAY_AGG, and
//!   auto-aggregation of non-grouped fields
//! - **Output**: json, table, csv, tsv, and raw file paths
//!
//! # Quick Start
//!
//! ```no_run
//! use biql::{Engine, OutputFormat};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::build(Path::new("/data/my-dataset"))?;
//! let rendered = engine.run_query(
//!     "SELECT sub, COUNT(*) WHERE datatype=func GROUP BY sub",
//!     OutputFormat::Json,
//! )?;
//! println!("{rendered}");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`ast`] - Query AST sum types
//! - [`engine`] - Engine facade (build, parse, evaluate, render)
//! - [`error`] - Error types
//! - [`eval`] - Predicate evaluation, grouping, aggregation
//! - [`filename`] - BIDS filename parsing
//! - [`index`] - Dataset walk and catalog construction
//! - [`lexer`] / [`parser`] - Query front-end
//! - [`model`] - Value and FileRecord types
//! - [`output`] - Result formatting
//! - [`participants`] - participants.tsv loading
//! - [`sidecar`] - JSON sidecar inheritance

pub mod ast;
pub mod engine;
pub mod error;
pub mod eval;
pub mod filename;
pub mod index;
pub mod lexer;
pub mod model;
pub mod output;
pub mod parser;
pub mod participants;
pub mod platform;
pub mod sidecar;

// Re-export the primary API surface
pub use engine::Engine;
pub use error::BiqlError;
pub use eval::{ResultSet, Row};
pub use index::{CancelToken, Catalog, DatasetStats};
pub use model::{FileRecord, Value};
pub use output::OutputFormat;
pub use parser::parse;
