//! # keydir
//!
//! Storage and ingestion layer for an OpenPGP public key directory, built on
//! [rpgp](https://docs.rs/pgp) and SQLite.
//!
//! This library provides:
//!
//! - **Lookup**: Resolve a key by fingerprint, 8-byte key ID or 4-byte short ID
//! - **Search**: Find keys by user ID keyword, with a cap on result size
//! - **Ingestion**: Load armored or binary key streams, merging each key into
//!   the stored record with the same fingerprint or inserting it
//! - **Identifiers**: Random opaque tokens for the service layer
//!
//! ## Quick Start
//!
//! ```no_run
//! use keydir::{KeyStore, StoreConfig};
//!
//! let store = KeyStore::open(&StoreConfig::new("/var/lib/keydir/keys.db")).unwrap();
//!
//! let armored = std::fs::read_to_string("alice.asc").unwrap();
//! store.add_key(&armored).unwrap();
//!
//! let key = store.lookup_key("0x7857DD79").unwrap();
//! println!("{}", key.to_armored().unwrap());
//! ```
//!
//! ## Identifier Forms
//!
//! | Hex digits | Bytes | Matches |
//! |------------|-------|---------|
//! | 8 | 4 | short ID (last 4 bytes of the fingerprint) |
//! | 16 | 8 | key ID (last 8 bytes of the fingerprint) |
//! | 40 | 20 | fingerprint |
//!
//! Anything else is `Error::InvalidKeyId`. Short and long key IDs can collide;
//! the first stored match wins.
//!
//! ## Features
//!
//! - `testutil`: key generators for tests

mod error;
mod types;
mod internal;

mod resolve;
mod merge;
mod ingest;
mod uuid;

pub mod keystore;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export error types
pub use error::{Error, Result};

// Re-export record types
pub use types::{Identity, KeyRecord, FINGERPRINT_LEN, KEYID_LEN, SHORTID_LEN};

// Re-export lookup
pub use resolve::KeyQuery;

// Re-export the store session
pub use keystore::{Durability, KeyStore, StoreConfig};

// Re-export merge
pub use merge::merge_keys;

// Re-export ingestion
pub use ingest::{read_keys, KeyEvent, LoadSummary, KEY_QUEUE_CAPACITY};

// Re-export identifier generation
pub use uuid::{new_uuid, UUID_LEN};
