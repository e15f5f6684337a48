//! Playlog core library.
//!
//! Turns raw play-event logs into three denormalized tables, one per access
//! pattern, and answers each canonical question with a single partition read.
//!
//! - [`normalize`]: raw CSV fields to typed play events
//! - [`catalog`]: the table schemas and their CQL
//! - [`materialize`]: one write tuple per table per event
//! - [`query`]: the three partition-scoped queries
//! - [`ingest`]: the sequential ingestion driver
//! - [`collect`]: input discovery, CSV reading, consolidation

pub mod catalog;
pub mod cli;
pub mod collect;
pub mod exit_codes;
pub mod ingest;
pub mod logging;
pub mod materialize;
pub mod normalize;
pub mod query;

pub use catalog::Catalog;
pub use exit_codes::ExitCode;
pub use ingest::{IngestError, IngestReport, Ingestor};
pub use materialize::{materialize, TableWrite};
pub use normalize::{MalformedRowError, Normalized, Normalizer};
pub use query::{Query, QueryResolver, QueryResult};
