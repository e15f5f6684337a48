//! Table materializer: one play event, one write per table.

use crate::catalog::Catalog;
use pl_common::{PlayEvent, Value};

/// A row ready to hand to the store gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct TableWrite<'c> {
    pub table: &'c str,
    /// Values in the table's column order.
    pub values: Vec<Value>,
}

/// Project `event` into every catalog table, in catalog order.
///
/// Pure and total: a valid event always yields one tuple per table.
pub fn materialize<'c>(catalog: &'c Catalog, event: &PlayEvent) -> Vec<TableWrite<'c>> {
    catalog
        .schemas()
        .iter()
        .map(|schema| TableWrite {
            table: schema.name.as_str(),
            values: schema.columns.iter().map(|f| event.value(*f)).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SONGS_PER_SESSION_AND_ITEM, SONGS_PER_USER_AND_SESSION, USERS_PER_SONG};

    fn event() -> PlayEvent {
        PlayEvent {
            artist: "Faithless".to_string(),
            song_title: "Music Matters (Mark Knight Dub)".to_string(),
            song_length: 495.3073,
            session_id: 338,
            item_in_session: 4,
            user_id: 50,
            first_name: "Ava".to_string(),
            last_name: "Robinson".to_string(),
        }
    }

    #[test]
    fn every_table_gets_one_tuple() {
        let catalog = Catalog::standard();
        let writes = materialize(&catalog, &event());
        let tables: Vec<_> = writes.iter().map(|w| w.table).collect();
        assert_eq!(
            tables,
            vec![SONGS_PER_SESSION_AND_ITEM, SONGS_PER_USER_AND_SESSION, USERS_PER_SONG]
        );
        for (write, schema) in writes.iter().zip(catalog.schemas()) {
            assert_eq!(write.values.len(), schema.columns.len());
        }
    }

    #[test]
    fn tuples_follow_declared_column_order() {
        let catalog = Catalog::standard();
        let writes = materialize(&catalog, &event());

        assert_eq!(
            writes[0].values,
            vec![
                Value::from("Faithless"),
                Value::from("Music Matters (Mark Knight Dub)"),
                Value::Float(495.3073),
                Value::Int(338),
                Value::Int(4),
            ]
        );
        assert_eq!(
            writes[2].values,
            vec![
                Value::from("Ava"),
                Value::from("Robinson"),
                Value::Int(50),
                Value::from("Music Matters (Mark Knight Dub)"),
            ]
        );
    }
}
