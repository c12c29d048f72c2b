//! Credential store
//!
//! A static username → password table, loaded once at startup and read-only
//! afterwards. Passwords are compared in plaintext.
//
// TODO: store salted password hashes instead of plaintext before exposing the
// server beyond a trusted network.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Lookup capability consumed by the session layer
pub trait CredentialStore: Send + Sync {
    /// Password registered for `username`, if any
    fn lookup(&self, username: &str) -> Option<&str>;

    /// Whether `username` exists and `password` matches it
    fn verify(&self, username: &str, password: &str) -> bool {
        self.lookup(username).is_some_and(|expected| expected == password)
    }
}

/// In-memory credential table
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    accounts: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the accounts file format: one `username password` pair per line
    ///
    /// Lines that do not split into exactly two space-separated fields are
    /// skipped, as are `#` comments. A repeated username replaces the earlier
    /// entry.
    pub fn parse(content: &str) -> Self {
        let mut credentials = Self::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            match line.split(' ').collect::<Vec<_>>().as_slice() {
                [username, password] if !username.is_empty() && !password.is_empty() => {
                    credentials.insert(*username, *password);
                }
                _ => debug!("Skipping accounts line {}", number + 1),
            }
        }
        credentials
    }

    /// Load an accounts file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read accounts file {}: {}", path.display(), e))
        })?;
        let credentials = Self::parse(&content);
        info!(
            "Loaded {} account(s) from {}",
            credentials.len(),
            path.display()
        );
        Ok(credentials)
    }

    pub fn insert(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.accounts.insert(username.into(), password.into());
    }

    /// Add every entry of `other`, replacing existing usernames
    pub fn merge(&mut self, other: impl IntoIterator<Item = (String, String)>) {
        self.accounts.extend(other);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl CredentialStore for StaticCredentials {
    fn lookup(&self, username: &str) -> Option<&str> {
        self.accounts.get(username).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for StaticCredentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().collect(),
        }
    }
}
