//! Play event data model.
//!
//! A [`PlayEvent`] is the canonical unit flowing from the normalizer into
//! materialization. [`Field`] names each of its eight attributes and is the
//! vocabulary every table schema is declared in; [`Value`] is the typed cell
//! that ends up in a store row.

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 32-bit signed integer (CQL `int`).
    Int,
    /// 32-bit float (CQL `float`).
    Float,
    /// UTF-8 text (CQL `text`).
    Text,
}

impl ColumnType {
    /// CQL type keyword.
    pub fn cql(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql())
    }
}

/// One attribute of a play event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Artist,
    SongTitle,
    SongLength,
    SessionId,
    ItemInSession,
    UserId,
    FirstName,
    LastName,
}

impl Field {
    /// Every field, in declaration order.
    pub const ALL: [Field; 8] = [
        Field::Artist,
        Field::SongTitle,
        Field::SongLength,
        Field::SessionId,
        Field::ItemInSession,
        Field::UserId,
        Field::FirstName,
        Field::LastName,
    ];

    /// Column name used in every table that projects this field.
    pub fn column_name(self) -> &'static str {
        match self {
            Field::Artist => "artist",
            Field::SongTitle => "song_title",
            Field::SongLength => "song_length",
            Field::SessionId => "session_id",
            Field::ItemInSession => "item_in_session",
            Field::UserId => "user_id",
            Field::FirstName => "first_name",
            Field::LastName => "last_name",
        }
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Field::SongLength => ColumnType::Float,
            Field::SessionId | Field::ItemInSession | Field::UserId => ColumnType::Int,
            Field::Artist | Field::SongTitle | Field::FirstName | Field::LastName => {
                ColumnType::Text
            }
        }
    }

    /// Look up a field by its column name.
    pub fn from_column_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column_name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A typed cell value.
///
/// Values are totally ordered so they can serve as partition and clustering
/// keys: variants compare in declaration order, floats by `total_cmp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Float(#[serde(serialize_with = "serialize_shortest")] f32),
    Text(String),
}

/// Emit an `f32` with its shortest round-trip digits (495.3073, not
/// 495.30731201171875).
fn serialize_shortest<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    match value.to_string().parse::<f64>() {
        Ok(wide) => serializer.serialize_f64(wide),
        Err(_) => serializer.serialize_f32(*value),
    }
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Text(_) => ColumnType::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One song play, normalized from a raw log row.
///
/// Immutable once constructed; every field is present and well-typed, and
/// `artist` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub artist: String,
    pub song_title: String,
    /// Song length in seconds.
    pub song_length: f32,
    pub session_id: i32,
    /// 0-based position within the session.
    pub item_in_session: i32,
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
}

impl PlayEvent {
    /// Typed value of one field.
    pub fn value(&self, field: Field) -> Value {
        match field {
            Field::Artist => Value::Text(self.artist.clone()),
            Field::SongTitle => Value::Text(self.song_title.clone()),
            Field::SongLength => Value::Float(self.song_length),
            Field::SessionId => Value::Int(self.session_id),
            Field::ItemInSession => Value::Int(self.item_in_session),
            Field::UserId => Value::Int(self.user_id),
            Field::FirstName => Value::Text(self.first_name.clone()),
            Field::LastName => Value::Text(self.last_name.clone()),
        }
    }
}
