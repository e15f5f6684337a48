//! Directory-backed keyspace.
//!
//! Layout under `<data_dir>/<keyspace>/`:
//! - `keyspace.json`: manifest with replication settings, catalog
//!   fingerprint, and the schema of every live table
//! - `<table>.parquet`: all rows of one table
//!
//! A [`DirectoryStore`] is the scoped store handle of a run. Opening loads
//! every table into a [`MemoryStore`]; DDL is persisted immediately, row
//! writes are flushed as Parquet on [`DirectoryStore::close`]. Dropping the
//! handle without closing flushes best-effort, so the handle is released
//! on every exit path.

use crate::error::{Result, StoreError};
use crate::gateway::{KeyPredicate, Row, StoreGateway};
use crate::memory::MemoryStore;
use crate::snapshot;
use chrono::{DateTime, Utc};
use pl_common::schema::{is_compatible, SCHEMA_VERSION};
use pl_common::{TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "keyspace.json";

/// Replication settings, opaque to the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replication {
    pub strategy: String,
    pub factor: String,
}

/// Persistent description of a keyspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceManifest {
    pub schema_version: String,
    pub keyspace: String,
    pub replication: Replication,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub catalog_fingerprint: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

impl KeyspaceManifest {
    fn new(keyspace: &str, replication: Replication) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            keyspace: keyspace.to_string(),
            replication,
            created_at: Utc::now(),
            catalog_fingerprint: None,
            tables: Vec::new(),
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let context = || format!("read manifest {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| StoreError::unavailable(context(), e))?;
        let manifest: Self =
            serde_json::from_str(&content).map_err(|e| StoreError::unavailable(context(), e))?;
        if !is_compatible(&manifest.schema_version) {
            return Err(StoreError::unavailable(
                context(),
                format!(
                    "manifest schema {} is incompatible with {}",
                    manifest.schema_version, SCHEMA_VERSION
                ),
            ));
        }
        Ok(manifest)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let context = || format!("write manifest {}", path.display());
        let json =
            serde_json::to_string_pretty(self).map_err(|e| StoreError::unavailable(context(), e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::unavailable(context(), e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::unavailable(context(), e))
    }
}

/// Scoped handle over one on-disk keyspace.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    manifest: KeyspaceManifest,
    engine: MemoryStore,
    dirty: BTreeSet<String>,
    closed: bool,
}

impl DirectoryStore {
    /// Create the keyspace directory and manifest. Existing keyspaces are
    /// left untouched.
    pub fn create_keyspace(data_dir: &Path, keyspace: &str, replication: Replication) -> Result<()> {
        let root = data_dir.join(keyspace);
        let manifest_path = root.join(MANIFEST_FILE);
        if manifest_path.exists() {
            debug!(keyspace, "keyspace exists, create is a no-op");
            return Ok(());
        }
        fs::create_dir_all(&root)
            .map_err(|e| StoreError::unavailable(format!("create {}", root.display()), e))?;
        KeyspaceManifest::new(keyspace, replication).save(&manifest_path)?;
        info!(keyspace, path = %root.display(), "keyspace created");
        Ok(())
    }

    /// Remove the keyspace and all of its tables. Missing keyspaces are a
    /// no-op.
    pub fn drop_keyspace(data_dir: &Path, keyspace: &str) -> Result<()> {
        let root = data_dir.join(keyspace);
        if !root.exists() {
            debug!(keyspace, "keyspace absent, drop is a no-op");
            return Ok(());
        }
        fs::remove_dir_all(&root)
            .map_err(|e| StoreError::unavailable(format!("remove {}", root.display()), e))?;
        info!(keyspace, "keyspace dropped");
        Ok(())
    }

    /// Open an existing keyspace and load its tables.
    pub fn open(data_dir: &Path, keyspace: &str) -> Result<Self> {
        let root = data_dir.join(keyspace);
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(StoreError::unavailable(
                format!("open keyspace {keyspace}"),
                format!("no manifest at {}; provision the keyspace first", manifest_path.display()),
            ));
        }
        let manifest = KeyspaceManifest::load(&manifest_path)?;

        let mut engine = MemoryStore::new();
        for schema in &manifest.tables {
            engine.create_table(schema)?;
            let path = table_path(&root, &schema.name);
            if !path.exists() {
                continue;
            }
            for row in snapshot::read_table(&path, schema)? {
                engine.execute_write(&schema.name, row.values)?;
            }
        }

        info!(
            keyspace,
            tables = manifest.tables.len(),
            path = %root.display(),
            "keyspace opened"
        );
        Ok(Self {
            root,
            manifest,
            engine,
            dirty: BTreeSet::new(),
            closed: false,
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.manifest.keyspace
    }

    pub fn manifest(&self) -> &KeyspaceManifest {
        &self.manifest
    }

    pub fn table_names(&self) -> Vec<String> {
        self.engine.table_names()
    }

    /// Rows currently held by the handle, flushed or not.
    pub fn engine(&self) -> &MemoryStore {
        &self.engine
    }

    /// Record the fingerprint of the catalog that shaped this keyspace.
    pub fn set_catalog_fingerprint(&mut self, fingerprint: &str) -> Result<()> {
        if self.manifest.catalog_fingerprint.as_deref() == Some(fingerprint) {
            return Ok(());
        }
        self.manifest.catalog_fingerprint = Some(fingerprint.to_string());
        self.save_manifest()
    }

    /// Write every table touched since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        let dirty = std::mem::take(&mut self.dirty);
        for name in &dirty {
            let Some(table) = self.engine.table(name) else {
                continue;
            };
            let path = table_path(&self.root, name);
            if let Err(err) = snapshot::write_table(&path, table.schema(), table.rows()) {
                // Keep the remaining tables dirty so a later flush retries.
                self.dirty.extend(dirty.iter().cloned());
                return Err(err);
            }
            debug!(table = %name, rows = table.len(), "table flushed");
        }
        Ok(())
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        self.closed = true;
        info!(keyspace = %self.manifest.keyspace, "keyspace closed");
        result
    }

    fn save_manifest(&self) -> Result<()> {
        self.manifest.save(&self.root.join(MANIFEST_FILE))
    }
}

impl StoreGateway for DirectoryStore {
    fn create_table(&mut self, schema: &TableSchema) -> Result<()> {
        if self.engine.schema(&schema.name).is_some() {
            debug!(table = %schema.name, "table exists, create is a no-op");
            return Ok(());
        }
        self.engine.create_table(schema)?;
        self.manifest.tables.push(schema.clone());
        self.save_manifest()?;
        self.dirty.insert(schema.name.clone());
        info!(table = %schema.name, "table created");
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        if self.engine.schema(table).is_none() {
            debug!(table, "table absent, drop is a no-op");
            return Ok(());
        }
        self.engine.drop_table(table)?;
        self.manifest.tables.retain(|t| t.name != table);
        self.save_manifest()?;
        self.dirty.remove(table);
        let path = table_path(&self.root, table);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| StoreError::unavailable(format!("remove {}", path.display()), e))?;
        }
        info!(table, "table dropped");
        Ok(())
    }

    fn execute_write(&mut self, table: &str, values: Vec<Value>) -> Result<()> {
        self.engine.execute_write(table, values)?;
        if !self.dirty.contains(table) {
            self.dirty.insert(table.to_string());
        }
        Ok(())
    }

    fn execute_read(&self, table: &str, predicate: &KeyPredicate) -> Result<Vec<Row>> {
        self.engine.execute_read(table, predicate)
    }

    fn row_count(&self, table: &str) -> Result<usize> {
        self.engine.row_count(table)
    }

    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.engine.schema(table)
    }
}

impl Drop for DirectoryStore {
    fn drop(&mut self) {
        if self.closed || self.dirty.is_empty() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, keyspace = %self.manifest.keyspace, "flush on release failed");
        }
    }
}

fn table_path(root: &Path, table: &str) -> PathBuf {
    root.join(format!("{table}.parquet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_common::Field;
    use tempfile::TempDir;

    fn replication() -> Replication {
        Replication {
            strategy: "SimpleStrategy".to_string(),
            factor: "1".to_string(),
        }
    }

    fn plays() -> TableSchema {
        TableSchema::new(
            "songs_per_user_and_session",
            &[Field::UserId, Field::SessionId],
            &[Field::ItemInSession],
            &[
                Field::UserId,
                Field::SessionId,
                Field::ItemInSession,
                Field::Artist,
            ],
        )
    }

    fn row(item: i32, artist: &str) -> Vec<Value> {
        vec![
            Value::Int(10),
            Value::Int(182),
            Value::Int(item),
            Value::from(artist),
        ]
    }

    #[test]
    fn open_requires_provisioned_keyspace() {
        let tmp = TempDir::new().unwrap();
        let err = DirectoryStore::open(tmp.path(), "missing").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn rows_survive_close_and_reopen() {
        let tmp = TempDir::new().unwrap();
        DirectoryStore::create_keyspace(tmp.path(), "ks", replication()).unwrap();

        let mut store = DirectoryStore::open(tmp.path(), "ks").unwrap();
        store.create_table(&plays()).unwrap();
        store
            .execute_write("songs_per_user_and_session", row(1, "Three Drives"))
            .unwrap();
        store
            .execute_write("songs_per_user_and_session", row(0, "Down To The Bone"))
            .unwrap();
        store.close().unwrap();

        let store = DirectoryStore::open(tmp.path(), "ks").unwrap();
        let rows = store
            .execute_read(
                "songs_per_user_and_session",
                &KeyPredicate::new()
                    .equals(Field::UserId, 10)
                    .equals(Field::SessionId, 182),
            )
            .unwrap();
        assert_eq!(
            rows,
            vec![
                Row::new(row(0, "Down To The Bone")),
                Row::new(row(1, "Three Drives"))
            ]
        );
    }

    #[test]
    fn dropping_handle_flushes_pending_writes() {
        let tmp = TempDir::new().unwrap();
        DirectoryStore::create_keyspace(tmp.path(), "ks", replication()).unwrap();
        {
            let mut store = DirectoryStore::open(tmp.path(), "ks").unwrap();
            store.create_table(&plays()).unwrap();
            store
                .execute_write("songs_per_user_and_session", row(0, "Down To The Bone"))
                .unwrap();
        }
        let store = DirectoryStore::open(tmp.path(), "ks").unwrap();
        assert_eq!(store.row_count("songs_per_user_and_session").unwrap(), 1);
    }

    #[test]
    fn ddl_is_idempotent_and_persisted() {
        let tmp = TempDir::new().unwrap();
        DirectoryStore::create_keyspace(tmp.path(), "ks", replication()).unwrap();
        DirectoryStore::create_keyspace(tmp.path(), "ks", replication()).unwrap();

        let mut store = DirectoryStore::open(tmp.path(), "ks").unwrap();
        store.create_table(&plays()).unwrap();
        store.create_table(&plays()).unwrap();
        assert_eq!(store.manifest().tables.len(), 1);
        store.drop_table("songs_per_user_and_session").unwrap();
        store.drop_table("songs_per_user_and_session").unwrap();
        store.close().unwrap();

        let store = DirectoryStore::open(tmp.path(), "ks").unwrap();
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn drop_keyspace_removes_everything() {
        let tmp = TempDir::new().unwrap();
        DirectoryStore::create_keyspace(tmp.path(), "ks", replication()).unwrap();
        DirectoryStore::drop_keyspace(tmp.path(), "ks").unwrap();
        DirectoryStore::drop_keyspace(tmp.path(), "ks").unwrap();
        assert!(!tmp.path().join("ks").exists());
    }
}
