//! Error types for the keydir library.
//!
//! Every fallible operation returns [`Error`]. The first three variants are
//! the lookup sentinels front ends map to their own responses (bad request,
//! not found, too many results); the rest wrap the cause they came from.

use thiserror::Error;

/// The main error type for keydir operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier is not hex, or decodes to an unsupported length
    #[error("Invalid key ID: {0}")]
    InvalidKeyId(String),

    /// Lookup produced no match
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Search matched more records than the caller allowed
    #[error("Too many responses: {count} matches exceed limit of {limit}")]
    TooManyResponses { count: usize, limit: usize },

    /// A record with this fingerprint already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Attempted to merge records of different keys
    #[error("Fingerprint mismatch: {existing} vs {incoming}")]
    FingerprintMismatch { existing: String, incoming: String },

    /// Armored data is malformed
    #[error("Malformed armored data: {0}")]
    MalformedArmor(String),

    /// Key material could not be parsed
    #[error("Key parsing failed: {0}")]
    Parse(String),

    /// Key has a fingerprint that is not 20 bytes long
    #[error("Unsupported key version: {0}-byte fingerprint")]
    UnsupportedKeyVersion(usize),

    /// Store configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Random source failed while generating an identifier
    #[error("Failed to generate identifier: {0}")]
    IdGeneration(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// rpgp OpenPGP error
    #[error("OpenPGP error: {0}")]
    OpenPgp(#[from] pgp::errors::Error),
}

/// A specialized Result type for keydir operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is the `KeyNotFound` sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }
}
