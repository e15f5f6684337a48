//! Playlog configuration loading and validation.
//!
//! This crate provides:
//! - Named-field mapping from raw CSV headers to play event fields
//! - Store and ingestion settings
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation run once at startup

pub mod mapping;
pub mod resolve;

pub use mapping::{FieldMapping, MappingError, ResolvedLayout, CONSOLIDATED_HEADER};
pub use resolve::{
    resolve_config, ConfigError, ConfigOverrides, ConfigPaths, ConfigSource, IngestConfig,
    PlayLogConfig, RowPolicy, StoreConfig,
};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
