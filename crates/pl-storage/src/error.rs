//! Error types for store operations.

use pl_common::{ColumnType, Field};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while talking to the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection, I/O, or decode failure. Fatal for the run; the gateway
    /// never retries.
    #[error("store unavailable: {context}: {source}")]
    Unavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A read that does not bind the full partition key, or that filters
    /// on a non-key column.
    #[error("unsupported predicate on {table}: {reason}")]
    UnsupportedPredicate { table: String, reason: String },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("write to {table} carries {actual} values, table has {expected} columns")]
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("column {column} of {table} expects {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: Field,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] pl_common::SchemaError),
}

impl StoreError {
    pub fn unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError::Unavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn predicate(table: &str, reason: impl Into<String>) -> Self {
        StoreError::UnsupportedPredicate {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

impl From<StoreError> for pl_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { .. } => pl_common::Error::StoreUnavailable(err.to_string()),
            StoreError::UnsupportedPredicate { table, reason } => {
                pl_common::Error::UnsupportedPredicate { table, reason }
            }
            other => pl_common::Error::StatementRejected(other.to_string()),
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
