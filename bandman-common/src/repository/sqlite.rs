//! SQLite-backed repository
//!
//! Each operation is a single statement, so SQLite's own atomicity is the
//! only concurrency control needed. Storage errors are logged and reported
//! as [`AddOutcome::Unavailable`] / [`RemoveOutcome::Unavailable`] or an
//! empty listing.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::error;

use super::{AddOutcome, RemoveOutcome, Repository};
use crate::models::{Event, Song};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Wrap a pool whose schema was created by [`crate::db::init_database`]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn query_performers(&self) -> Result<Vec<String>> {
        let performers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT performer FROM songs
            UNION
            SELECT performer FROM events
            ORDER BY performer ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(performers)
    }

    async fn query_songs(&self, performer: &str) -> Result<Vec<Song>> {
        let rows = sqlx::query(
            "SELECT name, author, length, bpm FROM songs WHERE performer = ? ORDER BY rowid",
        )
        .bind(performer)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Song> {
                Ok(Song {
                    name: row.try_get("name")?,
                    author: row.try_get("author")?,
                    length: row.try_get("length")?,
                    bpm: row.try_get::<i64, _>("bpm")?.clamp(0, u32::MAX as i64) as u32,
                    performer: performer.to_string(),
                })
            })
            .collect()
    }

    async fn query_events(&self, performer: &str) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT name, place, date, type FROM events WHERE performer = ? ORDER BY rowid",
        )
        .bind(performer)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Event> {
                Ok(Event {
                    name: row.try_get("name")?,
                    place: row.try_get("place")?,
                    date: row.try_get("date")?,
                    kind: row.try_get("type")?,
                    performer: performer.to_string(),
                })
            })
            .collect()
    }

    async fn insert_song(&self, song: &Song) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO songs (name, author, length, bpm, performer)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (performer, name) DO NOTHING
            "#,
        )
        .bind(&song.name)
        .bind(&song.author)
        .bind(song.length)
        .bind(song.bpm as i64)
        .bind(&song.performer)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_event(&self, event: &Event) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (name, place, date, type, performer)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (performer, name) DO NOTHING
            "#,
        )
        .bind(&event.name)
        .bind(&event.place)
        .bind(&event.date)
        .bind(&event.kind)
        .bind(&event.performer)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, table: Table, performer: &str, name: &str) -> Result<u64> {
        let sql = match table {
            Table::Songs => "DELETE FROM songs WHERE performer = ? AND name = ?",
            Table::Events => "DELETE FROM events WHERE performer = ? AND name = ?",
        };
        let result = sqlx::query(sql)
            .bind(performer)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Songs,
    Events,
}

fn add_outcome(result: Result<u64>, what: &str) -> AddOutcome {
    match result {
        Ok(0) => AddOutcome::Duplicate,
        Ok(_) => AddOutcome::Added,
        Err(e) => {
            error!("Failed to insert {}: {}", what, e);
            AddOutcome::Unavailable
        }
    }
}

fn remove_outcome(result: Result<u64>, what: &str) -> RemoveOutcome {
    match result {
        Ok(0) => RemoveOutcome::NotFound,
        Ok(_) => RemoveOutcome::Removed,
        Err(e) => {
            error!("Failed to delete {}: {}", what, e);
            RemoveOutcome::Unavailable
        }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_performers(&self) -> Vec<String> {
        self.query_performers().await.unwrap_or_else(|e| {
            error!("Failed to list performers: {}", e);
            Vec::new()
        })
    }

    async fn list_songs(&self, performer: &str) -> Vec<Song> {
        self.query_songs(performer).await.unwrap_or_else(|e| {
            error!(performer, "Failed to list songs: {}", e);
            Vec::new()
        })
    }

    async fn list_events(&self, performer: &str) -> Vec<Event> {
        self.query_events(performer).await.unwrap_or_else(|e| {
            error!(performer, "Failed to list events: {}", e);
            Vec::new()
        })
    }

    async fn add_song(&self, song: &Song) -> AddOutcome {
        add_outcome(self.insert_song(song).await, "song")
    }

    async fn add_event(&self, event: &Event) -> AddOutcome {
        add_outcome(self.insert_event(event).await, "event")
    }

    async fn remove_song(&self, performer: &str, name: &str) -> RemoveOutcome {
        remove_outcome(self.delete(Table::Songs, performer, name).await, "song")
    }

    async fn remove_event(&self, performer: &str, name: &str) -> RemoveOutcome {
        remove_outcome(self.delete(Table::Events, performer, name).await, "event")
    }
}
