//! In-memory partitioned engine.
//!
//! Each table is a map from partition key to a clustering-ordered map of
//! rows. Partition lookups are exact; rows inside a partition come back in
//! ascending clustering-key order.

use crate::error::{Result, StoreError};
use crate::gateway::{check_write, KeyPredicate, Row, StoreGateway};
use pl_common::{TableSchema, Value};
use std::collections::BTreeMap;
use tracing::debug;

type Partition = BTreeMap<Vec<Value>, Row>;

/// Rows and schema of one table.
#[derive(Debug, Clone)]
pub struct TableData {
    schema: TableSchema,
    partitions: BTreeMap<Vec<Value>, Partition>,
}

impl TableData {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            partitions: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// All rows, ordered by partition key then clustering key.
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.partitions.values().flat_map(|p| p.values())
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    fn upsert(&mut self, values: Vec<Value>) -> Result<()> {
        let (partition, clustering) = check_write(&self.schema, &values)?;
        self.partitions
            .entry(partition)
            .or_default()
            .insert(clustering, Row::new(values));
        Ok(())
    }
}

/// Partitioned store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, TableData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableData> + '_ {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableData> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn table_ref(&self, name: &str) -> Result<&TableData> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

impl StoreGateway for MemoryStore {
    fn create_table(&mut self, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        if self.tables.contains_key(&schema.name) {
            debug!(table = %schema.name, "table exists, create is a no-op");
            return Ok(());
        }
        self.tables
            .insert(schema.name.clone(), TableData::new(schema.clone()));
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        if self.tables.remove(table).is_none() {
            debug!(table, "table absent, drop is a no-op");
        }
        Ok(())
    }

    fn execute_write(&mut self, table: &str, values: Vec<Value>) -> Result<()> {
        self.table_mut(table)?.upsert(values)
    }

    fn execute_read(&self, table: &str, predicate: &KeyPredicate) -> Result<Vec<Row>> {
        let data = self.table_ref(table)?;
        let bound = predicate.bind(&data.schema)?;
        let Some(partition) = data.partitions.get(&bound.partition) else {
            return Ok(Vec::new());
        };
        let rows = partition
            .iter()
            .filter(|(clustering, _)| match (&bound.range, clustering.first()) {
                (Some(range), Some(first)) => range.contains(first),
                _ => true,
            })
            .map(|(_, row)| row.clone())
            .collect();
        Ok(rows)
    }

    fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.table_ref(table)?.len())
    }

    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).map(|t| &t.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_common::Field;

    fn listeners() -> TableSchema {
        TableSchema::new(
            "users_per_song",
            &[Field::SongTitle],
            &[Field::UserId],
            &[
                Field::SongTitle,
                Field::UserId,
                Field::FirstName,
                Field::LastName,
            ],
        )
    }

    fn play(title: &str, user: i32, first: &str, last: &str) -> Vec<Value> {
        vec![
            Value::from(title),
            Value::Int(user),
            Value::from(first),
            Value::from(last),
        ]
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_table(&listeners()).unwrap();
        store
    }

    #[test]
    fn create_and_drop_are_idempotent() {
        let mut store = store();
        store.create_table(&listeners()).unwrap();
        assert_eq!(store.table_names(), vec!["users_per_song".to_string()]);
        store.drop_table("users_per_song").unwrap();
        store.drop_table("users_per_song").unwrap();
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn same_key_write_replaces_previous_values() {
        let mut store = store();
        store
            .execute_write("users_per_song", play("Song", 7, "Old", "Name"))
            .unwrap();
        store
            .execute_write("users_per_song", play("Song", 7, "New", "Name"))
            .unwrap();

        assert_eq!(store.row_count("users_per_song").unwrap(), 1);
        let rows = store
            .execute_read(
                "users_per_song",
                &KeyPredicate::new().equals(Field::SongTitle, "Song"),
            )
            .unwrap();
        assert_eq!(rows, vec![Row::new(play("Song", 7, "New", "Name"))]);
    }

    #[test]
    fn reads_stay_inside_one_partition_in_clustering_order() {
        let mut store = store();
        store
            .execute_write("users_per_song", play("A", 80, "Tegan", "Levine"))
            .unwrap();
        store
            .execute_write("users_per_song", play("B", 1, "Other", "Song"))
            .unwrap();
        store
            .execute_write("users_per_song", play("A", 29, "Jacqueline", "Lynch"))
            .unwrap();

        let rows = store
            .execute_read("users_per_song", &KeyPredicate::new().equals(Field::SongTitle, "A"))
            .unwrap();
        let users: Vec<_> = rows.iter().map(|r| r.values[1].clone()).collect();
        assert_eq!(users, vec![Value::Int(29), Value::Int(80)]);
    }

    #[test]
    fn clustering_range_narrows_partition() {
        let mut store = store();
        for user in [3, 5, 9] {
            store
                .execute_write("users_per_song", play("A", user, "F", "L"))
                .unwrap();
        }
        let rows = store
            .execute_read(
                "users_per_song",
                &KeyPredicate::new()
                    .equals(Field::SongTitle, "A")
                    .clustering_range(Field::UserId, Value::Int(4)..),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_partition_reads_empty() {
        let store = store();
        let rows = store
            .execute_read(
                "users_per_song",
                &KeyPredicate::new().equals(Field::SongTitle, "nothing"),
            )
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn unknown_table_is_reported() {
        let mut store = MemoryStore::new();
        let err = store
            .execute_write("nope", vec![Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }
}
