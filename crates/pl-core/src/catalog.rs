//! Schema catalog: the three query-driven tables.
//!
//! Each table is declared once as a [`TableSchema`]. Materialization, DDL
//! rendering, and query binding all read from here, so a schema change is a
//! one-line edit rather than three parallel ones.

use pl_common::{Field, TableSchema};
use pl_storage::{StoreError, StoreGateway};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::debug;

/// Song played at a given session position.
pub const SONGS_PER_SESSION_AND_ITEM: &str = "songs_per_session_and_item";
/// Songs a user played within one session, in play order.
pub const SONGS_PER_USER_AND_SESSION: &str = "songs_per_user_and_session";
/// Users who played a given song, one row per user.
pub const USERS_PER_SONG: &str = "users_per_song";

/// Read-only registry of target table schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    schemas: Vec<TableSchema>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The three fixed tables, in materialization order.
    pub fn standard() -> Self {
        let schemas = vec![
            TableSchema::new(
                SONGS_PER_SESSION_AND_ITEM,
                &[Field::SessionId, Field::ItemInSession],
                &[],
                &[
                    Field::Artist,
                    Field::SongTitle,
                    Field::SongLength,
                    Field::SessionId,
                    Field::ItemInSession,
                ],
            ),
            TableSchema::new(
                SONGS_PER_USER_AND_SESSION,
                &[Field::UserId, Field::SessionId],
                &[Field::ItemInSession],
                &[
                    Field::Artist,
                    Field::SongTitle,
                    Field::FirstName,
                    Field::LastName,
                    Field::UserId,
                    Field::SessionId,
                    Field::ItemInSession,
                ],
            ),
            TableSchema::new(
                USERS_PER_SONG,
                &[Field::SongTitle],
                &[Field::UserId],
                &[
                    Field::FirstName,
                    Field::LastName,
                    Field::UserId,
                    Field::SongTitle,
                ],
            ),
        ];
        Self { schemas }
    }

    pub fn schemas(&self) -> &[TableSchema] {
        &self.schemas
    }

    pub fn lookup(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.iter().find(|s| s.name == table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.schemas.iter().map(|s| s.name.as_str())
    }

    /// Fields extracted from an event for `table`, in write-tuple order.
    pub fn write_fields(&self, table: &str) -> Option<&[Field]> {
        self.lookup(table).map(|s| s.columns.as_slice())
    }

    /// `CREATE TABLE IF NOT EXISTS` for every table.
    pub fn create_statements(&self) -> Vec<String> {
        self.schemas.iter().map(create_table_cql).collect()
    }

    /// `DROP TABLE IF EXISTS` for every table.
    pub fn drop_statements(&self) -> Vec<String> {
        self.schemas.iter().map(|s| drop_table_cql(&s.name)).collect()
    }

    /// Parameterized insert for every table.
    pub fn insert_statements(&self) -> Vec<String> {
        self.schemas.iter().map(insert_cql).collect()
    }

    /// Create every table through the gateway. Existing tables are kept.
    pub fn create_all<G: StoreGateway + ?Sized>(&self, gateway: &mut G) -> Result<(), StoreError> {
        for schema in &self.schemas {
            debug!(table = %schema.name, "create table");
            gateway.create_table(schema)?;
        }
        Ok(())
    }

    /// Drop every table through the gateway. Missing tables are ignored.
    pub fn drop_all<G: StoreGateway + ?Sized>(&self, gateway: &mut G) -> Result<(), StoreError> {
        for schema in &self.schemas {
            debug!(table = %schema.name, "drop table");
            gateway.drop_table(&schema.name)?;
        }
        Ok(())
    }

    /// SHA-256 over the serialized schemas, hex encoded.
    ///
    /// Stored alongside a provisioned keyspace to detect a store built from
    /// a different table layout.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for schema in &self.schemas {
            // TableSchema only holds strings and unit enums.
            let encoded = serde_json::to_vec(schema).unwrap_or_default();
            hasher.update(&encoded);
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

fn column_list(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.column_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn primary_key_clause(schema: &TableSchema) -> String {
    let partition = column_list(&schema.partition_key);
    let mut parts = Vec::with_capacity(1 + schema.clustering_key.len());
    if schema.partition_key.len() > 1 {
        parts.push(format!("({partition})"));
    } else {
        parts.push(partition);
    }
    parts.extend(
        schema
            .clustering_key
            .iter()
            .map(|f| f.column_name().to_string()),
    );
    format!("PRIMARY KEY ({})", parts.join(", "))
}

/// `CREATE TABLE IF NOT EXISTS` for one schema.
pub fn create_table_cql(schema: &TableSchema) -> String {
    let mut cql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.name);
    for field in &schema.columns {
        let _ = writeln!(cql, "    {} {},", field.column_name(), field.column_type().cql());
    }
    let _ = writeln!(cql, "    {}", primary_key_clause(schema));
    cql.push_str(");");
    cql
}

pub fn drop_table_cql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table};")
}

/// Insert with one positional `?` per column, in write-tuple order.
pub fn insert_cql(schema: &TableSchema) -> String {
    let placeholders = vec!["?"; schema.columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        schema.name,
        column_list(&schema.columns),
        placeholders
    )
}

/// Select of `columns` with one `= ?` condition per bound field.
pub fn select_cql(table: &str, columns: &[Field], bound: &[Field]) -> String {
    let conditions = bound
        .iter()
        .map(|f| format!("{} = ?", f.column_name()))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "SELECT {} FROM {} WHERE {};",
        column_list(columns),
        table,
        conditions
    )
}

pub fn create_keyspace_cql(keyspace: &str, strategy: &str, factor: &str) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
         {{ 'class' : '{strategy}', 'replication_factor' : {factor} }};"
    )
}

pub fn drop_keyspace_cql(keyspace: &str) -> String {
    format!("DROP KEYSPACE IF EXISTS {keyspace};")
}
