//! Error types for biql.
//!
//! Error codes are organized by category:
//!
//! - **BIQL-E001 to BIQL-E099**: Dataset and file I/O errors
//! - **BIQL-E100 to BIQL-E199**: Query syntax errors
//!   - BIQL-E101: Lexer rejected a character or literal
//!   - BIQL-E102: Parser expectation failure
//! - **BIQL-E200 to BIQL-E299**: Output errors
//! - **BIQL-E900 to BIQL-E999**: Internal and miscellaneous errors

use thiserror::Error;

/// Main error type for biql operations.
///
/// Warnings (sidecar parse failures, malformed participants rows, bad
/// regexes inside comparisons) are not errors: they go to the engine's
/// warning sink and the affected sidecar/row/comparison is skipped.
#[derive(Error, Debug)]
pub enum BiqlError {
    /// Dataset root directory not found at the specified path.
    #[error("Dataset not found: {path}")]
    DatasetNotFound { path: String },

    /// Dataset root exists but cannot be used (not a directory, unreadable).
    #[error("Dataset unreadable: {path} - {reason}")]
    DatasetUnreadable { path: String, reason: String },

    /// Lexer or parser failure, with 1-based source position.
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Formatting or writing the result stream failed.
    #[error("Output error: {reason}")]
    OutputError { reason: String },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl BiqlError {
    /// Returns the error code for this error.
    pub const fn error_code(&self) -> &'static str {
        match self {
            BiqlError::DatasetNotFound { .. } => "BIQL-E001",
            BiqlError::DatasetUnreadable { .. } => "BIQL-E002",
            BiqlError::Syntax { .. } => "BIQL-E102",
            BiqlError::OutputError { .. } => "BIQL-E201",
            BiqlError::IoError(_) => "BIQL-E901",
            BiqlError::JsonError(_) => "BIQL-E902",
        }
    }

    /// Process exit code for the CLI: 1 syntax, 2 dataset, 3 output, 4 other.
    pub const fn exit_code(&self) -> i32 {
        match self {
            BiqlError::Syntax { .. } => 1,
            BiqlError::DatasetNotFound { .. } | BiqlError::DatasetUnreadable { .. } => 2,
            BiqlError::OutputError { .. } => 3,
            BiqlError::IoError(_) | BiqlError::JsonError(_) => 3,
        }
    }

    /// Returns remediation hints for this error, if available.
    pub const fn remediation(&self) -> Option<&'static str> {
        match self {
            BiqlError::DatasetNotFound { .. } => {
                Some("Ensure the dataset path is correct and the directory exists.")
            }
            BiqlError::DatasetUnreadable { .. } => {
                Some("The dataset root must be a readable directory.")
            }
            BiqlError::Syntax { .. } => {
                Some("Check the query against the BIQL grammar; run with --validate for parse-only checking.")
            }
            BiqlError::OutputError { .. } => {
                Some("Check that the output destination is writable.")
            }
            BiqlError::IoError(_) => Some("Check file permissions and disk space."),
            BiqlError::JsonError(_) => {
                Some("JSON serialization error. This may indicate corrupted sidecar data.")
            }
        }
    }
}
