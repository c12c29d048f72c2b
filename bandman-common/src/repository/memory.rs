//! In-memory repository
//!
//! Used when no database path is configured, and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AddOutcome, RemoveOutcome, Repository};
use crate::models::{Event, Song};

#[derive(Debug, Default)]
struct Catalog {
    songs: Vec<Song>,
    events: Vec<Event>,
}

impl Catalog {
    fn is_empty(&self) -> bool {
        self.songs.is_empty() && self.events.is_empty()
    }
}

/// Catalogs held in process memory, lost on restart
#[derive(Debug, Default)]
pub struct MemoryRepository {
    catalogs: RwLock<BTreeMap<String, Catalog>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_performers(&self) -> Vec<String> {
        self.catalogs
            .read()
            .await
            .iter()
            .filter(|(_, catalog)| !catalog.is_empty())
            .map(|(performer, _)| performer.clone())
            .collect()
    }

    async fn list_songs(&self, performer: &str) -> Vec<Song> {
        self.catalogs
            .read()
            .await
            .get(performer)
            .map(|catalog| catalog.songs.clone())
            .unwrap_or_default()
    }

    async fn list_events(&self, performer: &str) -> Vec<Event> {
        self.catalogs
            .read()
            .await
            .get(performer)
            .map(|catalog| catalog.events.clone())
            .unwrap_or_default()
    }

    async fn add_song(&self, song: &Song) -> AddOutcome {
        let mut catalogs = self.catalogs.write().await;
        let catalog = catalogs.entry(song.performer.clone()).or_default();
        if catalog.songs.iter().any(|s| s.name == song.name) {
            return AddOutcome::Duplicate;
        }
        catalog.songs.push(song.clone());
        AddOutcome::Added
    }

    async fn add_event(&self, event: &Event) -> AddOutcome {
        let mut catalogs = self.catalogs.write().await;
        let catalog = catalogs.entry(event.performer.clone()).or_default();
        if catalog.events.iter().any(|e| e.name == event.name) {
            return AddOutcome::Duplicate;
        }
        catalog.events.push(event.clone());
        AddOutcome::Added
    }

    async fn remove_song(&self, performer: &str, name: &str) -> RemoveOutcome {
        let mut catalogs = self.catalogs.write().await;
        let Some(catalog) = catalogs.get_mut(performer) else {
            return RemoveOutcome::NotFound;
        };
        match catalog.songs.iter().position(|s| s.name == name) {
            Some(index) => {
                catalog.songs.remove(index);
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::NotFound,
        }
    }

    async fn remove_event(&self, performer: &str, name: &str) -> RemoveOutcome {
        let mut catalogs = self.catalogs.write().await;
        let Some(catalog) = catalogs.get_mut(performer) else {
            return RemoveOutcome::NotFound;
        };
        match catalog.events.iter().position(|e| e.name == name) {
            Some(index) => {
                catalog.events.remove(index);
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::NotFound,
        }
    }
}
