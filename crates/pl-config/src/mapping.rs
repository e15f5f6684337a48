//! Named-field mapping from raw CSV columns to play event fields.
//!
//! Raw event logs are wide and positional. Rather than relying on "column N
//! means field X" per row, the mapping names the source column for each
//! [`Field`] and is resolved once against a file header into a
//! [`ResolvedLayout`]. Every row of that file is then read through the
//! resolved positions.

use pl_common::Field;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header of the consolidated projected CSV, in column order.
pub const CONSOLIDATED_HEADER: [&str; 11] = [
    "artist",
    "firstName",
    "gender",
    "itemInSession",
    "lastName",
    "length",
    "level",
    "location",
    "sessionId",
    "song",
    "userId",
];

/// Errors raised while validating or resolving a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no source column configured for field {0}")]
    EmptyColumnName(Field),

    #[error("fields {first} and {second} are both mapped to column '{column}'")]
    DuplicateColumn {
        column: String,
        first: Field,
        second: Field,
    },

    #[error("column '{column}' for field {field} not found in header")]
    MissingColumn { field: Field, column: String },

    #[error("column '{column}' for field {field} appears more than once in header")]
    AmbiguousColumn { field: Field, column: String },
}

/// Source column name for every play event field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub artist: String,
    pub song_title: String,
    pub song_length: String,
    pub session_id: String,
    pub item_in_session: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            artist: "artist".to_string(),
            song_title: "song".to_string(),
            song_length: "length".to_string(),
            session_id: "sessionId".to_string(),
            item_in_session: "itemInSession".to_string(),
            user_id: "userId".to_string(),
            first_name: "firstName".to_string(),
            last_name: "lastName".to_string(),
        }
    }
}

impl FieldMapping {
    /// Configured source column for `field`.
    pub fn column_for(&self, field: Field) -> &str {
        match field {
            Field::Artist => &self.artist,
            Field::SongTitle => &self.song_title,
            Field::SongLength => &self.song_length,
            Field::SessionId => &self.session_id,
            Field::ItemInSession => &self.item_in_session,
            Field::UserId => &self.user_id,
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
        }
    }

    /// Reject empty names and two fields sharing one source column.
    pub fn validate(&self) -> Result<(), MappingError> {
        for (i, field) in Field::ALL.iter().enumerate() {
            let column = self.column_for(*field);
            if column.trim().is_empty() {
                return Err(MappingError::EmptyColumnName(*field));
            }
            if let Some(first) = Field::ALL[..i]
                .iter()
                .find(|other| self.column_for(**other) == column)
            {
                return Err(MappingError::DuplicateColumn {
                    column: column.to_string(),
                    first: *first,
                    second: *field,
                });
            }
        }
        Ok(())
    }

    /// Resolve the mapping against a header row.
    pub fn resolve<S: AsRef<str>>(&self, header: &[S]) -> Result<ResolvedLayout, MappingError> {
        self.validate()?;
        let mut positions = [0usize; 8];
        for field in Field::ALL {
            let column = self.column_for(field);
            let mut matches = header
                .iter()
                .enumerate()
                .filter(|(_, name)| name.as_ref().trim() == column)
                .map(|(idx, _)| idx);
            let position = matches.next().ok_or_else(|| MappingError::MissingColumn {
                field,
                column: column.to_string(),
            })?;
            if matches.next().is_some() {
                return Err(MappingError::AmbiguousColumn {
                    field,
                    column: column.to_string(),
                });
            }
            positions[slot(field)] = position;
        }
        Ok(ResolvedLayout {
            positions,
            width: header.len(),
        })
    }
}

/// Field positions validated against one concrete header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLayout {
    positions: [usize; 8],
    width: usize,
}

impl ResolvedLayout {
    /// Fixed layout of the consolidated 11-column CSV.
    pub fn consolidated() -> Self {
        // Default mapping over CONSOLIDATED_HEADER never fails.
        let mut positions = [0usize; 8];
        let mapping = FieldMapping::default();
        for field in Field::ALL {
            let column = mapping.column_for(field);
            positions[slot(field)] = CONSOLIDATED_HEADER
                .iter()
                .position(|name| *name == column)
                .unwrap_or_default();
        }
        Self {
            positions,
            width: CONSOLIDATED_HEADER.len(),
        }
    }

    /// Position of `field` within a raw row.
    pub fn position(&self, field: Field) -> usize {
        self.positions[slot(field)]
    }

    /// Number of fields every row is expected to carry.
    pub fn width(&self) -> usize {
        self.width
    }
}

fn slot(field: Field) -> usize {
    Field::ALL
        .iter()
        .position(|f| *f == field)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_HEADER: [&str; 17] = [
        "artist",
        "auth",
        "firstName",
        "gender",
        "itemInSession",
        "lastName",
        "length",
        "level",
        "location",
        "method",
        "page",
        "registration",
        "sessionId",
        "song",
        "status",
        "ts",
        "userId",
    ];

    #[test]
    fn consolidated_layout_matches_projected_order() {
        let layout = ResolvedLayout::consolidated();
        assert_eq!(layout.width(), 11);
        assert_eq!(layout.position(Field::Artist), 0);
        assert_eq!(layout.position(Field::FirstName), 1);
        assert_eq!(layout.position(Field::ItemInSession), 3);
        assert_eq!(layout.position(Field::LastName), 4);
        assert_eq!(layout.position(Field::SongLength), 5);
        assert_eq!(layout.position(Field::SessionId), 8);
        assert_eq!(layout.position(Field::SongTitle), 9);
        assert_eq!(layout.position(Field::UserId), 10);
    }

    #[test]
    fn resolving_consolidated_header_equals_fixed_layout() {
        let layout = FieldMapping::default()
            .resolve(&CONSOLIDATED_HEADER)
            .unwrap();
        assert_eq!(layout, ResolvedLayout::consolidated());
    }

    #[test]
    fn resolves_wide_raw_event_header() {
        let layout = FieldMapping::default().resolve(&RAW_HEADER).unwrap();
        assert_eq!(layout.width(), 17);
        assert_eq!(layout.position(Field::FirstName), 2);
        assert_eq!(layout.position(Field::SessionId), 12);
        assert_eq!(layout.position(Field::SongTitle), 13);
        assert_eq!(layout.position(Field::UserId), 16);
    }

    #[test]
    fn missing_column_is_reported_by_field() {
        let header = ["artist", "firstName"];
        let err = FieldMapping::default().resolve(&header).unwrap_err();
        assert!(matches!(err, MappingError::MissingColumn { .. }));
    }

    #[test]
    fn ambiguous_header_is_rejected() {
        let mut header: Vec<&str> = CONSOLIDATED_HEADER.to_vec();
        header.push("song");
        let err = FieldMapping::default().resolve(&header).unwrap_err();
        assert_eq!(
            err,
            MappingError::AmbiguousColumn {
                field: Field::SongTitle,
                column: "song".to_string()
            }
        );
    }

    #[test]
    fn duplicate_mapping_is_rejected_before_resolution() {
        let mapping = FieldMapping {
            last_name: "firstName".to_string(),
            ..FieldMapping::default()
        };
        assert!(matches!(
            mapping.validate(),
            Err(MappingError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn mapping_deserializes_with_partial_overrides() {
        let mapping: FieldMapping = serde_json::from_str(r#"{"song_title": "title"}"#).unwrap();
        assert_eq!(mapping.song_title, "title");
        assert_eq!(mapping.artist, "artist");
    }
}
