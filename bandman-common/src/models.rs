//! Catalog data model
//!
//! Songs and events are owned by a performer (band). Within one performer's
//! catalog the entity name is the primary key.

use serde::{Deserialize, Serialize};

/// Placeholder stored when a song author or event place is omitted
pub const UNKNOWN: &str = "unknown";

/// A song in a performer's repertoire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub author: String,
    /// Duration in seconds
    pub length: f64,
    pub bpm: u32,
    pub performer: String,
}

impl Song {
    /// Build a song, substituting [`UNKNOWN`] for a missing author
    pub fn new(
        name: impl Into<String>,
        author: Option<String>,
        length: f64,
        bpm: u32,
        performer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            author: author.unwrap_or_else(|| UNKNOWN.to_string()),
            length,
            bpm,
            performer: performer.into(),
        }
    }

    /// Same song re-owned by `performer`
    pub fn owned_by(mut self, performer: &str) -> Self {
        self.performer = performer.to_string();
        self
    }
}

/// A booked event (concert, festival, wedding...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub place: String,
    /// Free-form display date, never parsed
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub performer: String,
}

impl Event {
    /// Build an event, substituting [`UNKNOWN`] for a missing place
    pub fn new(
        name: impl Into<String>,
        place: Option<String>,
        date: impl Into<String>,
        kind: impl Into<String>,
        performer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            place: place.unwrap_or_else(|| UNKNOWN.to_string()),
            date: date.into(),
            kind: kind.into(),
            performer: performer.into(),
        }
    }

    /// Same event re-owned by `performer`
    pub fn owned_by(mut self, performer: &str) -> Self {
        self.performer = performer.to_string();
        self
    }
}
