//! Declarative table schemas.

use crate::model::{ColumnType, Field};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Violations of the schema invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyName,

    #[error("table {table} has no partition key")]
    NoPartitionKey { table: String },

    #[error("table {table}: key field {field} is not a projected column")]
    KeyNotProjected { table: String, field: Field },

    #[error("table {table}: field {field} appears more than once")]
    DuplicateField { table: String, field: Field },
}

/// Layout of one denormalized table.
///
/// `columns` is the ordered projection: it fixes both the write tuple order
/// and the column order of stored rows. Partition and clustering keys are
/// drawn from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub partition_key: Vec<Field>,
    #[serde(default)]
    pub clustering_key: Vec<Field>,
    pub columns: Vec<Field>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        partition_key: &[Field],
        clustering_key: &[Field],
        columns: &[Field],
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.to_vec(),
            clustering_key: clustering_key.to_vec(),
            columns: columns.to_vec(),
        }
    }

    /// Check `columns ⊇ partition_key ∪ clustering_key` and that no field
    /// is listed twice.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.partition_key.is_empty() {
            return Err(SchemaError::NoPartitionKey {
                table: self.name.clone(),
            });
        }
        for (i, field) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(field) {
                return Err(SchemaError::DuplicateField {
                    table: self.name.clone(),
                    field: *field,
                });
            }
        }
        let keys: Vec<Field> = self.primary_key().collect();
        for (i, field) in keys.iter().enumerate() {
            if keys[..i].contains(field) {
                return Err(SchemaError::DuplicateField {
                    table: self.name.clone(),
                    field: *field,
                });
            }
            if !self.columns.contains(field) {
                return Err(SchemaError::KeyNotProjected {
                    table: self.name.clone(),
                    field: *field,
                });
            }
        }
        Ok(())
    }

    /// Partition fields followed by clustering fields.
    pub fn primary_key(&self) -> impl Iterator<Item = Field> + '_ {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .copied()
    }

    /// Position of `field` in the column projection.
    pub fn column_index(&self, field: Field) -> Option<usize> {
        self.columns.iter().position(|f| *f == field)
    }

    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|f| f.column_type())
    }

    pub fn is_partition_field(&self, field: Field) -> bool {
        self.partition_key.contains(&field)
    }

    pub fn is_clustering_field(&self, field: Field) -> bool {
        self.clustering_key.contains(&field)
    }
}
