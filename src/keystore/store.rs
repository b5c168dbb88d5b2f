//! KeyStore implementation.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::resolve::KeyQuery;
use crate::types::{normalize_keyword, KeyRecord};

use super::config::StoreConfig;
use super::schema::init_schema;

/// SQLite-backed key record storage.
///
/// The `KeyStore` is the session every lookup, search and ingestion runs
/// against. It holds one connection configured for durable writes, and
/// indexes keys by fingerprint, key ID, short ID and identity keyword.
///
/// # Database Schema
///
/// - `keys`: one row per fingerprint (unique index), holding the binary key
/// - `identity_keywords`: search keywords of each identity
///
/// # Thread Safety
///
/// The `KeyStore` is `Send` but not `Sync`. Open one session per thread;
/// sessions on the same file coordinate through SQLite's locking, and the
/// unique fingerprint index decides racing inserts.
pub struct KeyStore {
    conn: Connection,
    path: Option<PathBuf>,
    search_limit: usize,
}

impl KeyStore {
    /// Open a store session.
    ///
    /// Creates the database and schema if needed, configures durability and
    /// makes sure every index exists. Any failure aborts the open.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use keydir::{KeyStore, StoreConfig};
    ///
    /// let store = KeyStore::open(&StoreConfig::new("/var/lib/keydir/keys.db")).unwrap();
    /// println!("Keys in store: {}", store.count().unwrap());
    /// ```
    #[tracing::instrument(skip(config), fields(connect = %config.connect))]
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        info!("Opening key store");

        let (conn, path) = if config.is_in_memory() {
            (Connection::open_in_memory()?, None)
        } else {
            let path = PathBuf::from(&config.connect);
            (Connection::open(&path)?, Some(path))
        };

        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        if path.is_some() {
            // Readers see the latest committed write; a writer never blocks them
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "Journal mode set");
        }
        conn.pragma_update(None, "synchronous", config.durability.pragma_value())?;

        init_schema(&conn)?;

        Ok(Self {
            conn,
            path,
            search_limit: config.search_limit,
        })
    }

    /// Create an in-memory keystore.
    ///
    /// # Example
    ///
    /// ```
    /// use keydir::KeyStore;
    ///
    /// let store = KeyStore::open_in_memory().unwrap();
    /// assert!(store.path().is_none());
    /// assert_eq!(store.count().unwrap(), 0);
    /// ```
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Look up a key by fingerprint, key ID or short ID.
    ///
    /// The identifier is a hex string; its decoded length selects the
    /// field that is matched (see [`KeyQuery::parse`]).
    ///
    /// # Errors
    /// - `Error::InvalidKeyId` if the identifier is malformed
    /// - `Error::KeyNotFound` if nothing matches
    ///
    /// # Example
    ///
    /// ```no_run
    /// use keydir::{KeyStore, StoreConfig};
    ///
    /// let store = KeyStore::open(&StoreConfig::new("keys.db")).unwrap();
    /// let key = store.lookup_key("0x7857DD79").unwrap();
    /// println!("{}: {:?}", key.fingerprint, key.user_ids());
    /// ```
    pub fn lookup_key(&self, id: &str) -> Result<KeyRecord> {
        let query = KeyQuery::parse(id)?;
        self.find_key(&query)
    }

    /// Run a parsed query.
    ///
    /// Key IDs and short IDs can collide; when several records match, the
    /// one stored first is returned.
    pub fn find_key(&self, query: &KeyQuery) -> Result<KeyRecord> {
        let result = match query {
            KeyQuery::ShortId(shortid) => self.conn.query_row(
                "SELECT keyid, shortid, key_data FROM keys WHERE shortid = ?1 ORDER BY id LIMIT 1",
                params![shortid.as_slice()],
                stored_row,
            ),
            KeyQuery::KeyId(keyid) => self.conn.query_row(
                "SELECT keyid, shortid, key_data FROM keys WHERE keyid = ?1 ORDER BY id LIMIT 1",
                params![keyid.as_slice()],
                stored_row,
            ),
            KeyQuery::Fingerprint(fingerprint) => self.conn.query_row(
                "SELECT keyid, shortid, key_data FROM keys WHERE fingerprint = ?1",
                params![fingerprint],
                stored_row,
            ),
        };

        match result {
            Ok(row) => row.into_record(),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::KeyNotFound(query.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Export a key as an ASCII-armored public key block.
    ///
    /// Resolves `id` like [`lookup_key`](Self::lookup_key).
    pub fn export_armored(&self, id: &str) -> Result<String> {
        self.lookup_key(id)?.to_armored()
    }

    /// Search keys by identity keyword.
    ///
    /// Matches are exact on a normalized keyword: a full user ID, an email
    /// address, or a single word of a user ID. Matches are counted first;
    /// if there are more than `limit`, nothing is loaded.
    ///
    /// # Errors
    /// Returns `Error::TooManyResponses` if more than `limit` keys match.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use keydir::{KeyStore, StoreConfig};
    ///
    /// let store = KeyStore::open(&StoreConfig::new("keys.db")).unwrap();
    /// for key in store.lookup_keys("alice@example.com", 20).unwrap() {
    ///     println!("{}", key.fingerprint);
    /// }
    /// ```
    #[tracing::instrument(skip(self))]
    pub fn lookup_keys(&self, term: &str, limit: usize) -> Result<Vec<KeyRecord>> {
        let keyword = normalize_keyword(term);

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT key_id) FROM identity_keywords WHERE keyword = ?1",
            [&keyword],
            |row| row.get(0),
        )?;
        let count = count as usize;
        if count > limit {
            debug!(count, "Search result over limit");
            return Err(Error::TooManyResponses { count, limit });
        }

        let mut stmt = self.conn.prepare(
            "SELECT keyid, shortid, key_data FROM keys
             WHERE id IN (SELECT key_id FROM identity_keywords WHERE keyword = ?1)
             ORDER BY id",
        )?;

        let rows = stmt.query_map([&keyword], stored_row)?;

        let mut keys = Vec::with_capacity(count);
        for row in rows {
            keys.push(row?.into_record()?);
        }

        Ok(keys)
    }

    /// Search with the configured default limit.
    pub fn search(&self, term: &str) -> Result<Vec<KeyRecord>> {
        self.lookup_keys(term, self.search_limit)
    }

    /// Insert a new record.
    ///
    /// The key row and its keywords are written in one transaction.
    ///
    /// # Errors
    /// Returns `Error::DuplicateKey` if a record with the same fingerprint
    /// already exists.
    pub fn insert_key(&self, record: &KeyRecord) -> Result<()> {
        let data = record.to_bytes()?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO keys (fingerprint, keyid, shortid, key_data) VALUES (?1, ?2, ?3, ?4)",
            params![
                &record.fingerprint,
                record.keyid.as_slice(),
                record.shortid.as_slice(),
                data
            ],
        )
        .map_err(|e| duplicate_or(e, &record.fingerprint))?;

        let key_id = tx.last_insert_rowid();
        write_keywords(&tx, key_id, record)?;

        tx.commit()?;
        Ok(())
    }

    /// Replace the stored record with the same fingerprint.
    ///
    /// The whole record is rewritten in one transaction.
    ///
    /// # Errors
    /// Returns `Error::KeyNotFound` if no record has this fingerprint.
    pub fn replace_key(&self, record: &KeyRecord) -> Result<()> {
        let data = record.to_bytes()?;
        let tx = self.conn.unchecked_transaction()?;

        // Write first so the transaction takes the write lock up front
        let updated = tx.execute(
            "UPDATE keys SET keyid = ?1, shortid = ?2, key_data = ?3, updated_at = CURRENT_TIMESTAMP
             WHERE fingerprint = ?4",
            params![
                record.keyid.as_slice(),
                record.shortid.as_slice(),
                data,
                &record.fingerprint
            ],
        )?;
        if updated == 0 {
            return Err(Error::KeyNotFound(record.fingerprint.clone()));
        }

        let key_id: i64 = tx.query_row(
            "SELECT id FROM keys WHERE fingerprint = ?1",
            [&record.fingerprint],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM identity_keywords WHERE key_id = ?1", [key_id])?;
        write_keywords(&tx, key_id, record)?;

        tx.commit()?;
        Ok(())
    }

    /// Check if a key exists by fingerprint.
    pub fn contains(&self, fingerprint: &str) -> Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM keys WHERE fingerprint = ?1",
            [fingerprint.to_lowercase()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List all fingerprints in document order.
    pub fn list_fingerprints(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT fingerprint FROM keys ORDER BY id")?;

        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut fingerprints = Vec::new();
        for row in rows {
            fingerprints.push(row?);
        }

        Ok(fingerprints)
    }

    /// Get record count.
    ///
    /// # Example
    ///
    /// ```
    /// use keydir::KeyStore;
    ///
    /// let store = KeyStore::open_in_memory().unwrap();
    /// assert_eq!(store.count().unwrap(), 0);
    /// ```
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM keys", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get the database path, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Columns of a `keys` row needed to rebuild a record.
struct StoredRow {
    keyid: Vec<u8>,
    shortid: Vec<u8>,
    key_data: Vec<u8>,
}

fn stored_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        keyid: row.get(0)?,
        shortid: row.get(1)?,
        key_data: row.get(2)?,
    })
}

impl StoredRow {
    /// Parse the key and take `keyid`/`shortid` from the stored columns,
    /// which lookups matched on, rather than recomputing them.
    fn into_record(self) -> Result<KeyRecord> {
        let mut record = KeyRecord::from_bytes(&self.key_data)?;
        record.keyid = stored_id(&self.keyid, "keyid")?;
        record.shortid = stored_id(&self.shortid, "shortid")?;
        Ok(record)
    }
}

fn stored_id<const N: usize>(raw: &[u8], column: &str) -> Result<[u8; N]> {
    raw.try_into().map_err(|_| {
        Error::Parse(format!(
            "stored {} has {} bytes, expected {}",
            column,
            raw.len(),
            N
        ))
    })
}

/// Index every keyword of every identity of `record` under `key_id`.
fn write_keywords(conn: &Connection, key_id: i64, record: &KeyRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO identity_keywords (key_id, identity, keyword) VALUES (?1, ?2, ?3)",
    )?;

    for (position, identity) in record.identities.iter().enumerate() {
        for keyword in &identity.keywords {
            stmt.execute(params![key_id, position as i64, keyword])?;
        }
    }

    Ok(())
}

/// Map a unique-constraint violation to `Error::DuplicateKey`.
fn duplicate_or(err: rusqlite::Error, fingerprint: &str) -> Error {
    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
        Error::DuplicateKey(fingerprint.to_string())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keystore_open_in_memory() {
        let store = KeyStore::open_in_memory().unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_fingerprints().unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let result = KeyStore::open(&StoreConfig::new(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_lookup_key_not_found() {
        let store = KeyStore::open_in_memory().unwrap();

        let result = store.lookup_key("A4F388BBB194925AE301F844C52B42177857DD79");
        assert!(matches!(result, Err(Error::KeyNotFound(_))));

        let result = store.lookup_key("C52B42177857DD79");
        assert!(matches!(result, Err(Error::KeyNotFound(_))));

        let result = store.lookup_key("7857DD79");
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_lookup_key_invalid() {
        let store = KeyStore::open_in_memory().unwrap();
        assert!(matches!(
            store.lookup_key("00112233445566"),
            Err(Error::InvalidKeyId(_))
        ));
        assert!(matches!(
            store.lookup_key("zz"),
            Err(Error::InvalidKeyId(_))
        ));
    }

    #[test]
    fn test_stored_id_length() {
        let id: [u8; 4] = stored_id(&[1, 2, 3, 4], "shortid").unwrap();
        assert_eq!(id, [1, 2, 3, 4]);

        let result: Result<[u8; 8]> = stored_id(&[1, 2, 3], "keyid");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_lookup_keys_empty() {
        let store = KeyStore::open_in_memory().unwrap();
        assert!(store.lookup_keys("alice", 10).unwrap().is_empty());
        assert!(store.search("alice").unwrap().is_empty());
    }

    #[test]
    fn test_contains_missing() {
        let store = KeyStore::open_in_memory().unwrap();
        assert!(!store
            .contains("DEADBEEFDEADBEEFDEADBEEFDEADBEEFDEADBEEF")
            .unwrap());
    }
}
