//! Database initialization

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open or create the catalog database at `db_path` and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets listings proceed while another session writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Private in-memory database with the catalog schema
///
/// Limited to one connection: every SQLite `:memory:` connection is its own
/// database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create the catalog tables (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_songs_table(pool).await?;
    create_events_table(pool).await?;
    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            name TEXT NOT NULL,
            author TEXT NOT NULL DEFAULT 'unknown',
            length REAL NOT NULL CHECK (length >= 0),
            bpm INTEGER NOT NULL CHECK (bpm >= 0),
            performer TEXT NOT NULL,
            PRIMARY KEY (performer, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            name TEXT NOT NULL,
            place TEXT NOT NULL DEFAULT 'unknown',
            date TEXT NOT NULL,
            type TEXT NOT NULL,
            performer TEXT NOT NULL,
            PRIMARY KEY (performer, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
