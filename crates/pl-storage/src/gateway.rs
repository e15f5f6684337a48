//! Store gateway contract.
//!
//! The gateway is the only thing ingestion and query resolution know about
//! the store. Writes are upserts keyed by partition + clustering key; reads
//! are scoped to exactly one partition.

use crate::error::{Result, StoreError};
use pl_common::{Field, TableSchema, Value};
use std::ops::{Bound, RangeBounds};

/// Executor for DDL, writes, and partition-scoped reads.
pub trait StoreGateway {
    /// Create a table. Creating an existing table is a no-op.
    fn create_table(&mut self, schema: &TableSchema) -> Result<()>;

    /// Drop a table. Dropping a missing table is a no-op.
    fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Persist one row; `values` follow the table's column order. A row with
    /// an existing key replaces the previous values.
    fn execute_write(&mut self, table: &str, values: Vec<Value>) -> Result<()>;

    /// Rows of the single partition bound by `predicate`, in clustering order.
    fn execute_read(&self, table: &str, predicate: &KeyPredicate) -> Result<Vec<Row>>;

    /// Total rows stored in a table, across all partitions.
    fn row_count(&self, table: &str) -> Result<usize>;

    fn schema(&self, table: &str) -> Option<&TableSchema>;
}

/// One stored row, values in the table's column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value of `field`, if the table projects it.
    pub fn get(&self, schema: &TableSchema, field: Field) -> Option<&Value> {
        schema
            .column_index(field)
            .and_then(|idx| self.values.get(idx))
    }

    /// Values of `fields`, in the order given. Fields the table does not
    /// project are skipped.
    pub fn project(&self, schema: &TableSchema, fields: &[Field]) -> Vec<Value> {
        fields
            .iter()
            .filter_map(|f| self.get(schema, *f).cloned())
            .collect()
    }
}

/// Restriction on the first clustering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRange {
    pub field: Field,
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ClusteringRange {
    pub fn contains(&self, value: &Value) -> bool {
        (self.lower.as_ref(), self.upper.as_ref()).contains(value)
    }
}

/// Key predicate of a read: equality bindings plus an optional clustering
/// range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPredicate {
    bindings: Vec<(Field, Value)>,
    range: Option<ClusteringRange>,
}

/// A predicate checked against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BoundPredicate {
    pub partition: Vec<Value>,
    pub range: Option<ClusteringRange>,
}

impl KeyPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `field = value`.
    pub fn equals(mut self, field: Field, value: impl Into<Value>) -> Self {
        self.bindings.push((field, value.into()));
        self
    }

    /// Restrict the first clustering column to `range`.
    pub fn clustering_range(mut self, field: Field, range: impl RangeBounds<Value>) -> Self {
        self.range = Some(ClusteringRange {
            field,
            lower: range.start_bound().cloned(),
            upper: range.end_bound().cloned(),
        });
        self
    }

    pub fn bindings(&self) -> &[(Field, Value)] {
        &self.bindings
    }

    pub fn range(&self) -> Option<&ClusteringRange> {
        self.range.as_ref()
    }

    /// Fields bound by equality, in binding order.
    pub fn bound_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.bindings.iter().map(|(f, _)| *f)
    }

    /// Check the predicate against `schema`.
    ///
    /// Every partition field must be bound exactly once. Equality on the
    /// first clustering column is folded into an inclusive range. Anything
    /// else would need filtering and is rejected.
    pub(crate) fn bind(&self, schema: &TableSchema) -> Result<BoundPredicate> {
        let table = schema.name.as_str();
        let first_clustering = schema.clustering_key.first().copied();
        let mut range = self.range.clone();

        for (i, (field, value)) in self.bindings.iter().enumerate() {
            if self.bindings[..i].iter().any(|(f, _)| f == field) {
                return Err(StoreError::predicate(table, format!("{field} bound twice")));
            }
            if value.column_type() != field.column_type() {
                return Err(StoreError::TypeMismatch {
                    table: table.to_string(),
                    column: *field,
                    expected: field.column_type(),
                    actual: value.column_type(),
                });
            }
            if schema.is_partition_field(*field) {
                continue;
            }
            if Some(*field) == first_clustering && range.is_none() {
                range = Some(ClusteringRange {
                    field: *field,
                    lower: Bound::Included(value.clone()),
                    upper: Bound::Included(value.clone()),
                });
                continue;
            }
            return Err(StoreError::predicate(
                table,
                format!("{field} is not a partition key column; filtering is not supported"),
            ));
        }

        if let Some(r) = &range {
            if Some(r.field) != first_clustering {
                return Err(StoreError::predicate(
                    table,
                    format!("range on {} requires it to be the first clustering column", r.field),
                ));
            }
        }

        let mut partition = Vec::with_capacity(schema.partition_key.len());
        for field in &schema.partition_key {
            let value = self
                .bindings
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    StoreError::predicate(table, format!("partition key column {field} is not bound"))
                })?;
            partition.push(value);
        }

        Ok(BoundPredicate { partition, range })
    }
}

/// Check a write tuple against the schema and split out its key.
pub(crate) fn check_write(schema: &TableSchema, values: &[Value]) -> Result<(Vec<Value>, Vec<Value>)> {
    if values.len() != schema.columns.len() {
        return Err(StoreError::ArityMismatch {
            table: schema.name.clone(),
            expected: schema.columns.len(),
            actual: values.len(),
        });
    }
    for (field, value) in schema.columns.iter().zip(values) {
        if value.column_type() != field.column_type() {
            return Err(StoreError::TypeMismatch {
                table: schema.name.clone(),
                column: *field,
                expected: field.column_type(),
                actual: value.column_type(),
            });
        }
    }
    let key = |fields: &[Field]| -> Vec<Value> {
        fields
            .iter()
            .filter_map(|f| schema.column_index(*f).map(|idx| values[idx].clone()))
            .collect()
    };
    Ok((key(&schema.partition_key), key(&schema.clustering_key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
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

    #[test]
    fn full_partition_binding_is_accepted() {
        let bound = KeyPredicate::new()
            .equals(Field::SessionId, 182)
            .equals(Field::UserId, 10)
            .bind(&schema())
            .unwrap();
        // Partition values follow key order, not binding order.
        assert_eq!(bound.partition, vec![Value::Int(10), Value::Int(182)]);
        assert!(bound.range.is_none());
    }

    #[test]
    fn partial_partition_binding_is_rejected() {
        let err = KeyPredicate::new()
            .equals(Field::UserId, 10)
            .bind(&schema())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedPredicate { .. }));
    }

    #[test]
    fn filtering_on_regular_column_is_rejected() {
        let err = KeyPredicate::new()
            .equals(Field::UserId, 10)
            .equals(Field::SessionId, 182)
            .equals(Field::Artist, "Three Drives")
            .bind(&schema())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedPredicate { .. }));
    }

    #[test]
    fn clustering_equality_becomes_point_range() {
        let bound = KeyPredicate::new()
            .equals(Field::UserId, 10)
            .equals(Field::SessionId, 182)
            .equals(Field::ItemInSession, 2)
            .bind(&schema())
            .unwrap();
        let range = bound.range.unwrap();
        assert!(range.contains(&Value::Int(2)));
        assert!(!range.contains(&Value::Int(3)));
    }

    #[test]
    fn range_on_non_clustering_column_is_rejected() {
        let err = KeyPredicate::new()
            .equals(Field::UserId, 10)
            .equals(Field::SessionId, 182)
            .clustering_range(Field::Artist, Value::from("A")..)
            .bind(&schema())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedPredicate { .. }));
    }

    #[test]
    fn binding_type_must_match_column() {
        let err = KeyPredicate::new()
            .equals(Field::UserId, "10")
            .equals(Field::SessionId, 182)
            .bind(&schema())
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn write_tuple_is_checked_and_keyed() {
        let values = vec![
            Value::Int(10),
            Value::Int(182),
            Value::Int(0),
            Value::from("Down To The Bone"),
        ];
        let (partition, clustering) = check_write(&schema(), &values).unwrap();
        assert_eq!(partition, vec![Value::Int(10), Value::Int(182)]);
        assert_eq!(clustering, vec![Value::Int(0)]);

        let short = check_write(&schema(), &values[..3]).unwrap_err();
        assert!(matches!(short, StoreError::ArityMismatch { expected: 4, actual: 3, .. }));
    }
}
