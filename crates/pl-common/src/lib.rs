//! Playlog common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the playlog crates:
//! - The play event model and its typed values
//! - Declarative table schemas
//! - Run identifiers and schema versioning
//! - Common error types
//! - Output format selection

pub mod error;
pub mod id;
pub mod model;
pub mod output;
pub mod schema;
pub mod table;

pub use error::{Error, Result};
pub use id::RunId;
pub use model::{ColumnType, Field, PlayEvent, Value};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
pub use table::{SchemaError, TableSchema};
