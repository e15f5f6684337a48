//! Row normalizer: raw CSV fields to [`PlayEvent`].
//!
//! Field positions come from a [`ResolvedLayout`] validated once per input
//! file. The normalizer itself never decides whether a bad row stops the
//! run; it reports and the caller applies its row policy.

use pl_common::{Field, PlayEvent};
use pl_config::ResolvedLayout;
use thiserror::Error;

/// A row that cannot become a play event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRowError {
    #[error("row has {actual} fields, expected at least {expected}")]
    TooFewFields { expected: usize, actual: usize },

    #[error("{field} is not an integer: '{value}'")]
    InvalidInteger { field: Field, value: String },

    #[error("{field} is not a finite number: '{value}'")]
    InvalidFloat { field: Field, value: String },
}

/// Outcome of normalizing one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(PlayEvent),
    /// Empty artist; not a song play.
    Discarded,
}

impl Normalized {
    pub fn into_event(self) -> Option<PlayEvent> {
        match self {
            Normalized::Event(event) => Some(event),
            Normalized::Discarded => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    layout: ResolvedLayout,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::consolidated()
    }
}

impl Normalizer {
    pub fn new(layout: ResolvedLayout) -> Self {
        Self { layout }
    }

    /// Normalizer over the 11-column consolidated CSV.
    pub fn consolidated() -> Self {
        Self::new(ResolvedLayout::consolidated())
    }

    /// Validate and cast one raw row.
    pub fn normalize<S: AsRef<str>>(&self, raw: &[S]) -> Result<Normalized, MalformedRowError> {
        if raw.len() < self.layout.width() {
            return Err(MalformedRowError::TooFewFields {
                expected: self.layout.width(),
                actual: raw.len(),
            });
        }
        let cell = |field: Field| raw[self.layout.position(field)].as_ref();

        // Blank counts as empty, but text is stored as written.
        let artist = cell(Field::Artist);
        if artist.trim().is_empty() {
            return Ok(Normalized::Discarded);
        }

        Ok(Normalized::Event(PlayEvent {
            artist: artist.to_string(),
            song_title: cell(Field::SongTitle).to_string(),
            song_length: parse_float(Field::SongLength, cell(Field::SongLength))?,
            session_id: parse_int(Field::SessionId, cell(Field::SessionId))?,
            item_in_session: parse_int(Field::ItemInSession, cell(Field::ItemInSession))?,
            user_id: parse_int(Field::UserId, cell(Field::UserId))?,
            first_name: cell(Field::FirstName).to_string(),
            last_name: cell(Field::LastName).to_string(),
        }))
    }
}

fn parse_int(field: Field, value: &str) -> Result<i32, MalformedRowError> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| MalformedRowError::InvalidInteger {
            field,
            value: value.to_string(),
        })
}

fn parse_float(field: Field, value: &str) -> Result<f32, MalformedRowError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MalformedRowError::InvalidFloat {
            field,
            value: value.to_string(),
        })
}
