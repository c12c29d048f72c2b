//! Database bootstrap
//!
//! Opens (creating if needed) the SQLite catalog database and makes sure the
//! `songs` and `events` tables exist. No seed data is inserted.

pub mod init;

pub use init::*;
