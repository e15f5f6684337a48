//! Error types for Playlog.

use thiserror::Error;

/// Result type alias for Playlog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Playlog.
///
/// Crate-local errors (`MappingError`, `StoreError`, `IngestError`, ...)
/// convert into this type at the CLI boundary so every failure carries a
/// stable numeric code.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid field mapping: {0}")]
    InvalidMapping(String),

    // Input errors (20-29)
    #[error("malformed row at {location}: {reason}")]
    MalformedRow { location: String, reason: String },

    #[error("input collection failed: {0}")]
    Collection(String),

    // Store errors (30-39)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("unsupported predicate on {table}: {reason}")]
    UnsupportedPredicate { table: String, reason: String },

    #[error("statement rejected by store: {0}")]
    StatementRejected(String),

    #[error("write to {table} failed at {location}: {reason}")]
    WriteFailed {
        table: String,
        location: String,
        reason: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidMapping(_) => 11,
            Error::MalformedRow { .. } => 20,
            Error::Collection(_) => 21,
            Error::StoreUnavailable(_) => 30,
            Error::UnsupportedPredicate { .. } => 31,
            Error::StatementRejected(_) => 32,
            Error::WriteFailed { .. } => 33,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Whether a run hitting this error must abort.
    ///
    /// Only malformed rows are recoverable; the caller's row policy decides.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedRow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(
            Error::MalformedRow {
                location: "a.csv:3".into(),
                reason: "bad".into()
            }
            .code(),
            20
        );
        assert_eq!(Error::StoreUnavailable("down".into()).code(), 30);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Error::from(io).code(), 60);
    }

    #[test]
    fn only_malformed_rows_are_recoverable() {
        let malformed = Error::MalformedRow {
            location: "a.csv:3".into(),
            reason: "bad".into(),
        };
        assert!(!malformed.is_fatal());
        assert!(Error::StoreUnavailable("down".into()).is_fatal());
        assert!(Error::UnsupportedPredicate {
            table: "t".into(),
            reason: "r".into()
        }
        .is_fatal());
    }
}
