//! Catalog persistence
//!
//! The [`Repository`] trait is the narrow interface the session layer talks
//! to. Every operation is scoped to a performer. Implementations own their
//! consistency and absorb storage failures: callers only ever see outcomes.

use async_trait::async_trait;

use crate::models::{Event, Song};

pub mod memory;
#[cfg(feature = "sqlx")]
pub mod sqlite;

pub use memory::MemoryRepository;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteRepository;

/// Result of an `add_*` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An entity with the same name already exists for that performer
    Duplicate,
    /// The store failed; nothing was written
    Unavailable,
}

/// Result of a `remove_*` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    /// The store failed; nothing was deleted
    Unavailable,
}

/// Song and event storage keyed by performer
#[async_trait]
pub trait Repository: Send + Sync {
    /// Distinct performers owning at least one song or event, sorted
    async fn list_performers(&self) -> Vec<String>;

    /// Songs of `performer`; empty for an unknown performer
    async fn list_songs(&self, performer: &str) -> Vec<Song>;

    /// Events of `performer`; empty for an unknown performer
    async fn list_events(&self, performer: &str) -> Vec<Event>;

    /// Insert unless the performer already has a song with that name
    async fn add_song(&self, song: &Song) -> AddOutcome;

    /// Insert unless the performer already has an event with that name
    async fn add_event(&self, event: &Event) -> AddOutcome;

    async fn remove_song(&self, performer: &str, name: &str) -> RemoveOutcome;

    async fn remove_event(&self, performer: &str, name: &str) -> RemoveOutcome;
}
