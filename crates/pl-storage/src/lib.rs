//! Playlog partitioned store.
//!
//! This crate provides:
//! - The store gateway contract used by ingestion and query resolution
//! - An in-memory partitioned engine
//! - Arrow schemas and Parquet persistence for table rows
//! - A directory-backed keyspace acting as the scoped store handle

pub mod directory;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod snapshot;

pub use directory::{DirectoryStore, KeyspaceManifest, Replication};
pub use error::{Result, StoreError};
pub use gateway::{ClusteringRange, KeyPredicate, Row, StoreGateway};
pub use memory::{MemoryStore, TableData};
pub use snapshot::{arrow_schema, columns_schema, rows_to_batch, values_to_batch};
