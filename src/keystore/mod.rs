//! SQLite-backed key storage.
//!
//! This module owns the store session: the connection, its durability
//! settings, and the indexes that make lookups and searches cheap and keep
//! one record per fingerprint.
//!
//! # Basic Usage
//!
//! ```no_run
//! use keydir::{KeyStore, StoreConfig};
//!
//! let store = KeyStore::open(&StoreConfig::new("/var/lib/keydir/keys.db")).unwrap();
//!
//! // Ingest an armored key block
//! let armored = std::fs::read_to_string("alice.asc").unwrap();
//! store.add_key(&armored).unwrap();
//!
//! // Look it up by any identifier form
//! let key = store.lookup_key("0x7857DD79").unwrap();
//! println!("{} - {:?}", key.fingerprint, key.user_ids());
//! ```
//!
//! # Searching for Keys
//!
//! ```no_run
//! use keydir::{Error, KeyStore, StoreConfig};
//!
//! let store = KeyStore::open(&StoreConfig::new("keys.db")).unwrap();
//!
//! match store.lookup_keys("alice@example.com", 10) {
//!     Ok(keys) => println!("{} keys", keys.len()),
//!     Err(Error::TooManyResponses { count, .. }) => println!("{} matches, narrow it down", count),
//!     Err(e) => panic!("{}", e),
//! }
//! ```
//!
//! # In-Memory Store for Testing
//!
//! ```
//! use keydir::KeyStore;
//!
//! let store = KeyStore::open_in_memory().unwrap();
//! assert_eq!(store.count().unwrap(), 0);
//! ```

mod config;
mod schema;
mod store;

pub use config::{Durability, StoreConfig, IN_MEMORY};
pub use store::KeyStore;
