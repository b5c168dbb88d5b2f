//! Configuration for the key store session.
//!
//! [`StoreConfig`] is deserializable so a front end can embed it in its own
//! configuration file:
//!
//! ```
//! use keydir::{Durability, StoreConfig};
//!
//! let config: StoreConfig = serde_json::from_str(
//!     r#"{ "connect": "/var/lib/keydir/keys.db", "busy_timeout": "10s" }"#,
//! ).unwrap();
//! assert_eq!(config.durability, Durability::Full);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connection string for a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Default time a session waits on a locked database (5 seconds).
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on search results.
const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Configuration for [`KeyStore`](crate::KeyStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file path, or `:memory:`.
    pub connect: String,

    /// Write durability.
    #[serde(default)]
    pub durability: Durability,

    /// How long to wait for another session's write lock.
    #[serde(with = "humantime_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,

    /// Result cap used by [`KeyStore::search`](crate::KeyStore::search).
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_busy_timeout() -> Duration {
    DEFAULT_BUSY_TIMEOUT
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl StoreConfig {
    /// Configuration with defaults for the given connection string.
    pub fn new(connect: impl Into<String>) -> Self {
        Self {
            connect: connect.into(),
            durability: Durability::default(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Configuration for a private in-memory store.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    /// Set the write durability.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the default search limit.
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Whether this configuration names an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.connect == IN_MEMORY
    }

    /// Check the configuration for values the store cannot work with.
    ///
    /// # Errors
    /// Returns `Error::Config` for an empty connection string or a zero
    /// search limit.
    pub fn validate(&self) -> Result<()> {
        if self.connect.trim().is_empty() {
            return Err(Error::Config("connect must not be empty".to_string()));
        }
        if self.search_limit == 0 {
            return Err(Error::Config("search_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// How hard a commit works to reach stable storage before it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Sync to disk on every commit.
    #[default]
    Full,
    /// Sync at checkpoints only. Faster, may lose the latest commits on power loss.
    Normal,
}

impl Durability {
    /// Value for SQLite's `synchronous` pragma.
    pub(crate) fn pragma_value(&self) -> &'static str {
        match self {
            Durability::Full => "FULL",
            Durability::Normal => "NORMAL",
        }
    }
}
