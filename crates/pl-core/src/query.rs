//! Query resolver: the three canonical questions, one partition read each.

use crate::catalog::{
    select_cql, Catalog, SONGS_PER_SESSION_AND_ITEM, SONGS_PER_USER_AND_SESSION, USERS_PER_SONG,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use pl_common::{Field, Value};
use pl_storage::{values_to_batch, KeyPredicate, StoreError, StoreGateway};
use serde::Serialize;
use tracing::debug;

/// A bound business question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    /// Q1: artist, title, and length of the song at a session position.
    SongInSession {
        session_id: i32,
        item_in_session: i32,
    },
    /// Q2: songs a user played in one session, in play order.
    UserSession { user_id: i32, session_id: i32 },
    /// Q3: every user who played a song.
    SongListeners { song_title: String },
}

impl Query {
    pub fn q1() -> Self {
        Query::SongInSession {
            session_id: 338,
            item_in_session: 4,
        }
    }

    pub fn q2() -> Self {
        Query::UserSession {
            user_id: 10,
            session_id: 182,
        }
    }

    pub fn q3() -> Self {
        Query::SongListeners {
            song_title: "All Hands Against His Own".to_string(),
        }
    }

    /// Q1-Q3 with their canonical parameters.
    pub fn canonical() -> [Query; 3] {
        [Self::q1(), Self::q2(), Self::q3()]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Query::SongInSession { .. } => "q1",
            Query::UserSession { .. } => "q2",
            Query::SongListeners { .. } => "q3",
        }
    }

    /// Table whose partition answers this query.
    pub fn table(&self) -> &'static str {
        match self {
            Query::SongInSession { .. } => SONGS_PER_SESSION_AND_ITEM,
            Query::UserSession { .. } => SONGS_PER_USER_AND_SESSION,
            Query::SongListeners { .. } => USERS_PER_SONG,
        }
    }

    /// Result columns.
    pub fn columns(&self) -> &'static [Field] {
        match self {
            Query::SongInSession { .. } => &[Field::Artist, Field::SongTitle, Field::SongLength],
            Query::UserSession { .. } => &[
                Field::Artist,
                Field::SongTitle,
                Field::FirstName,
                Field::LastName,
            ],
            Query::SongListeners { .. } => &[Field::FirstName, Field::LastName],
        }
    }

    /// Equality bindings for the full partition key.
    pub fn predicate(&self) -> KeyPredicate {
        match self {
            Query::SongInSession {
                session_id,
                item_in_session,
            } => KeyPredicate::new()
                .equals(Field::SessionId, *session_id)
                .equals(Field::ItemInSession, *item_in_session),
            Query::UserSession {
                user_id,
                session_id,
            } => KeyPredicate::new()
                .equals(Field::UserId, *user_id)
                .equals(Field::SessionId, *session_id),
            Query::SongListeners { song_title } => {
                KeyPredicate::new().equals(Field::SongTitle, song_title.as_str())
            }
        }
    }

    /// Parameterized select this query stands for.
    pub fn cql(&self) -> String {
        let bound: Vec<Field> = self.predicate().bound_fields().collect();
        select_cql(self.table(), self.columns(), &bound)
    }
}

/// Ordered rows answering one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub query: Query,
    pub table: &'static str,
    pub columns: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one result column, top to bottom.
    pub fn column(&self, field: Field) -> Vec<&Value> {
        let Some(idx) = self.columns.iter().position(|f| *f == field) else {
            return Vec::new();
        };
        self.rows.iter().filter_map(|r| r.get(idx)).collect()
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        values_to_batch(&self.columns, self.rows.iter().map(Vec::as_slice))
    }

    /// Box-drawn table for terminal output.
    pub fn render_table(&self) -> Result<String, ArrowError> {
        let batch = self.to_record_batch()?;
        Ok(pretty_format_batches(&[batch])?.to_string())
    }

    /// Rows as JSON objects keyed by column name.
    pub fn rows_json(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(field, value)| {
                        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                        (field.column_name().to_string(), value)
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Runs queries against a store through the gateway contract.
pub struct QueryResolver<'a, G: ?Sized> {
    gateway: &'a G,
    catalog: &'a Catalog,
}

impl<'a, G: StoreGateway + ?Sized> QueryResolver<'a, G> {
    pub fn new(gateway: &'a G, catalog: &'a Catalog) -> Self {
        Self { gateway, catalog }
    }

    /// Issue the single partition read behind `query`.
    pub fn resolve(&self, query: &Query) -> Result<QueryResult, StoreError> {
        let table = query.table();
        let schema = self
            .catalog
            .lookup(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let rows = self.gateway.execute_read(table, &query.predicate())?;
        debug!(query = query.label(), table, rows = rows.len(), "query resolved");

        Ok(QueryResult {
            query: query.clone(),
            table,
            columns: query.columns().to_vec(),
            rows: rows
                .iter()
                .map(|row| row.project(schema, query.columns()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::materialize;
    use pl_common::PlayEvent;
    use pl_storage::MemoryStore;

    fn play(session_id: i32, item: i32, user_id: i32, artist: &str, title: &str) -> PlayEvent {
        PlayEvent {
            artist: artist.to_string(),
            song_title: title.to_string(),
            song_length: 495.3073,
            session_id,
            item_in_session: item,
            user_id,
            first_name: "Sylvie".to_string(),
            last_name: "Cruz".to_string(),
        }
    }

    fn store_with(events: &[PlayEvent]) -> (MemoryStore, Catalog) {
        let catalog = Catalog::standard();
        let mut store = MemoryStore::new();
        catalog.create_all(&mut store).unwrap();
        for event in events {
            for write in materialize(&catalog, event) {
                store.execute_write(write.table, write.values).unwrap();
            }
        }
        (store, catalog)
    }

    #[test]
    fn every_query_binds_its_full_partition_key() {
        let catalog = Catalog::standard();
        for query in Query::canonical() {
            let schema = catalog.lookup(query.table()).unwrap();
            let bound: Vec<Field> = query.predicate().bound_fields().collect();
            for field in &schema.partition_key {
                assert!(bound.contains(field), "{} misses {field}", query.label());
            }
            for field in query.columns() {
                assert!(schema.column_index(*field).is_some());
            }
        }
    }

    #[test]
    fn cql_matches_the_partition_read() {
        assert_eq!(
            Query::q1().cql(),
            "SELECT artist, song_title, song_length FROM songs_per_session_and_item \
             WHERE session_id = ? AND item_in_session = ?;"
        );
        assert_eq!(
            Query::q3().cql(),
            "SELECT first_name, last_name FROM users_per_song WHERE song_title = ?;"
        );
    }

    #[test]
    fn user_session_rows_come_back_in_play_order() {
        let (store, catalog) = store_with(&[
            play(182, 2, 10, "Sebastien Tellier", "Kilometer"),
            play(182, 0, 10, "Down To The Bone", "Keep On Keepin' On"),
            play(183, 1, 10, "Other Session", "Elsewhere"),
            play(182, 1, 10, "Three Drives", "Greece 2000"),
        ]);
        let result = QueryResolver::new(&store, &catalog)
            .resolve(&Query::q2())
            .unwrap();
        let artists: Vec<_> = result
            .column(Field::Artist)
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(
            artists,
            vec![
                Value::from("Down To The Bone"),
                Value::from("Three Drives"),
                Value::from("Sebastien Tellier"),
            ]
        );
    }

    #[test]
    fn missing_partition_yields_empty_result() {
        let (store, catalog) = store_with(&[]);
        let result = QueryResolver::new(&store, &catalog)
            .resolve(&Query::q1())
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns.len(), 3);
    }

    #[test]
    fn unprovisioned_store_reports_unknown_table() {
        let store = MemoryStore::new();
        let catalog = Catalog::standard();
        let err = QueryResolver::new(&store, &catalog)
            .resolve(&Query::q3())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[test]
    fn result_renders_as_table_and_json() {
        let (store, catalog) = store_with(&[play(
            338,
            4,
            50,
            "Faithless",
            "Music Matters (Mark Knight Dub)",
        )]);
        let result = QueryResolver::new(&store, &catalog)
            .resolve(&Query::q1())
            .unwrap();

        let table = result.render_table().unwrap();
        assert!(table.contains("song_title"));
        assert!(table.contains("Faithless"));

        let json = result.rows_json();
        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["artist"], "Faithless");
        assert_eq!(json[0]["song_length"], 495.3073);
        assert_eq!(serde_json::to_string(&json[0]["song_length"]).unwrap(), "495.3073");
    }
}
