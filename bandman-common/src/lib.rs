//! # BandManager Common Library
//!
//! Shared code for the BandManager server and its clients:
//! - Song / Event data model
//! - Line-oriented wire codec and command vocabulary
//! - Repository trait with in-memory and SQLite adapters
//! - Credential store
//! - Configuration loading
//! - Protocol client

pub mod client;
pub mod config;
pub mod credentials;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
pub mod protocol;
pub mod repository;

pub use error::{Error, Result};
pub use models::{Event, Song, UNKNOWN};
