//! Error types for the Tessera library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`TesseraError`] enum. Query evaluation itself rarely fails: malformed
//! sub-expressions degrade to "no match" and only index or storage I/O
//! failures are propagated to the caller.
//!
//! # Examples
//!
//! ```
//! use tessera::error::{Result, TesseraError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(TesseraError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors (segments, commits, readers)
    #[error("Index error: {0}")]
    Index(String),

    /// Query-related errors (invalid query trees)
    #[error("Query error: {0}")]
    Query(String),

    /// A distance constraint whose bounds make no sense
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A document, segment or file that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A match identifier that cannot be parsed
    #[error("Invalid match identifier: {0}")]
    InvalidMatchId(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        TesseraError::Index(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        TesseraError::Query(msg.into())
    }

    /// Create a new constraint error.
    pub fn invalid_constraint<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidConstraint(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TesseraError::Storage(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TesseraError::NotFound(msg.into())
    }

    /// Create a new match identifier error.
    pub fn invalid_match_id<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidMatchId(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(format!("Internal error: {}", msg.into()))
    }
}
