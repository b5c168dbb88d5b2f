//! Database schema and migrations for the keystore.

use rusqlite::Connection;

/// Current schema version, the number of the newest migration in `migrate`.
pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema.
///
/// Creates the tables if needed and makes sure every index exists, including
/// the unique fingerprint index that keeps one record per key.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    // Create version table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    // Check current version
    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current_version < SCHEMA_VERSION {
        migrate(conn, current_version)?;
    }

    ensure_indexes(conn)
}

/// Run migrations from current version to latest.
fn migrate(conn: &Connection, from_version: u32) -> rusqlite::Result<()> {
    if from_version < 1 {
        migrate_v1(conn)?;
    }

    // Update version
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Migration to version 1 - initial schema.
fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    // One row per key; rowid order is the document order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT NOT NULL,
            keyid BLOB NOT NULL,
            shortid BLOB NOT NULL,
            key_data BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Search keywords, one row per (identity, keyword)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS identity_keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_id INTEGER NOT NULL,
            identity INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            FOREIGN KEY (key_id) REFERENCES keys(id) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

/// Create any missing index.
fn ensure_indexes(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_keys_fingerprint ON keys(fingerprint)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_keys_keyid ON keys(keyid)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_keys_shortid ON keys(shortid)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_identity_keywords_key_id ON identity_keywords(key_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_identity_keywords_keyword ON identity_keywords(keyword)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        // Verify tables exist
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('keys', 'identity_keywords')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_twice() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let names = index_names(&conn);
        assert!(names.contains(&"idx_keys_fingerprint".to_string()));
        assert!(names.contains(&"idx_identity_keywords_keyword".to_string()));
    }

    #[test]
    fn test_fingerprint_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let insert = "INSERT INTO keys (fingerprint, keyid, shortid, key_data) VALUES ('aa', x'00', x'00', x'00')";
        conn.execute(insert, []).unwrap();
        let err = conn.execute(insert, []).unwrap_err();
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }
}
