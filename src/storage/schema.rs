//! SQLite schema and the three storage statements.
//!
//! `read_from_storage_key`, `write_to_storage_key` and `clear_storage_key`
//! are the whole contract with the database. Write and clear run inside a
//! `BEGIN IMMEDIATE` transaction and use `RETURNING` so the version check and
//! the update are one atomic step.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;

use super::StoredRecord;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS grain_state (
    grain_key  TEXT PRIMARY KEY NOT NULL,
    payload    BLOB,
    version    INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Apply pragmas for read-write connections.
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    // journal_mode returns the resulting mode as a row
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Apply pragmas for read-only connections.
pub fn apply_reader_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(())
}

/// Create the grain state table if it does not exist.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Fetch the row for a grain key.
pub fn read_from_storage_key(conn: &Connection, grain_key: &str) -> rusqlite::Result<StoredRecord> {
    let row = conn
        .query_row(
            "SELECT payload, version FROM grain_state WHERE grain_key = ?1",
            params![grain_key],
            |row| Ok((row.get::<_, Option<Vec<u8>>>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    Ok(match row {
        None => StoredRecord::Absent,
        Some((Some(payload), version)) if !payload.is_empty() => {
            StoredRecord::Present { payload, version }
        }
        Some((_, version)) => StoredRecord::Empty { version },
    })
}

/// Store a payload if the row is at `expected`; returns the new version.
pub fn write_to_storage_key(
    conn: &mut Connection,
    grain_key: &str,
    expected: Option<i64>,
    payload: &[u8],
    now: i64,
) -> rusqlite::Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let version = match expected {
        None => tx
            .query_row(
                "INSERT INTO grain_state (grain_key, payload, version, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (grain_key) DO NOTHING
                 RETURNING version",
                params![grain_key, payload, now],
                |row| row.get(0),
            )
            .optional()?,
        Some(expected) => tx
            .query_row(
                "UPDATE grain_state
                 SET payload = ?2, version = version + 1, updated_at = ?3
                 WHERE grain_key = ?1 AND version = ?4
                 RETURNING version",
                params![grain_key, payload, now, expected],
                |row| row.get(0),
            )
            .optional()?,
    };

    tx.commit()?;
    Ok(version)
}

/// Void the payload if the row is at `expected`; returns the new version.
///
/// Clearing a key with no row and no expected version leaves an empty row at
/// version 1, so the caller gets a version to write against next.
pub fn clear_storage_key(
    conn: &mut Connection,
    grain_key: &str,
    expected: Option<i64>,
    now: i64,
) -> rusqlite::Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let version = match expected {
        None => tx
            .query_row(
                "INSERT INTO grain_state (grain_key, payload, version, updated_at)
                 VALUES (?1, NULL, 1, ?2)
                 ON CONFLICT (grain_key) DO NOTHING
                 RETURNING version",
                params![grain_key, now],
                |row| row.get(0),
            )
            .optional()?,
        Some(expected) => tx
            .query_row(
                "UPDATE grain_state
                 SET payload = NULL, version = version + 1, updated_at = ?2
                 WHERE grain_key = ?1 AND version = ?3
                 RETURNING version",
                params![grain_key, now, expected],
                |row| row.get(0),
            )
            .optional()?,
    };

    tx.commit()?;
    Ok(version)
}

/// A row summary for inspection tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub grain_key: String,
    pub version: i64,
    pub has_payload: bool,
    pub updated_at: i64,
}

/// List all rows in key order.
pub fn list_storage_keys(conn: &Connection) -> rusqlite::Result<Vec<KeyInfo>> {
    let mut stmt = conn.prepare(
        "SELECT grain_key, version, payload IS NOT NULL AND length(payload) > 0, updated_at
         FROM grain_state ORDER BY grain_key ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(KeyInfo {
                grain_key: row.get(0)?,
                version: row.get(1)?,
                has_payload: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open();
        initialize_schema(&conn).unwrap();
    }

    #[test]
    fn test_first_write_creates_version_one() {
        let mut conn = open();
        assert_eq!(read_from_storage_key(&conn, "k").unwrap(), StoredRecord::Absent);

        let version = write_to_storage_key(&mut conn, "k", None, b"v1", 1).unwrap();
        assert_eq!(version, Some(1));
        assert_eq!(
            read_from_storage_key(&conn, "k").unwrap(),
            StoredRecord::Present {
                payload: b"v1".to_vec(),
                version: 1
            }
        );
    }

    #[test]
    fn test_write_requires_matching_version() {
        let mut conn = open();
        write_to_storage_key(&mut conn, "k", None, b"v1", 1).unwrap();

        assert_eq!(write_to_storage_key(&mut conn, "k", None, b"x", 2).unwrap(), None);
        assert_eq!(write_to_storage_key(&mut conn, "k", Some(5), b"x", 2).unwrap(), None);
        assert_eq!(write_to_storage_key(&mut conn, "k", Some(1), b"v2", 2).unwrap(), Some(2));

        assert_eq!(
            read_from_storage_key(&conn, "k").unwrap(),
            StoredRecord::Present {
                payload: b"v2".to_vec(),
                version: 2
            }
        );
    }

    #[test]
    fn test_write_with_version_on_missing_row_rejected() {
        let mut conn = open();
        assert_eq!(write_to_storage_key(&mut conn, "k", Some(3), b"x", 1).unwrap(), None);
        assert_eq!(read_from_storage_key(&conn, "k").unwrap(), StoredRecord::Absent);
    }

    #[test]
    fn test_clear_keeps_row_and_bumps_version() {
        let mut conn = open();
        write_to_storage_key(&mut conn, "k", None, b"v1", 1).unwrap();

        assert_eq!(clear_storage_key(&mut conn, "k", Some(1), 2).unwrap(), Some(2));
        assert_eq!(
            read_from_storage_key(&conn, "k").unwrap(),
            StoredRecord::Empty { version: 2 }
        );
        assert_eq!(clear_storage_key(&mut conn, "k", Some(1), 3).unwrap(), None);
    }

    #[test]
    fn test_clear_of_missing_row_creates_tombstone() {
        let mut conn = open();
        assert_eq!(clear_storage_key(&mut conn, "k", None, 1).unwrap(), Some(1));
        assert_eq!(
            read_from_storage_key(&conn, "k").unwrap(),
            StoredRecord::Empty { version: 1 }
        );
    }

    #[test]
    fn test_empty_payload_reads_as_empty() {
        let mut conn = open();
        write_to_storage_key(&mut conn, "k", None, b"", 1).unwrap();
        assert_eq!(
            read_from_storage_key(&conn, "k").unwrap(),
            StoredRecord::Empty { version: 1 }
        );
    }

    #[test]
    fn test_list_storage_keys() {
        let mut conn = open();
        write_to_storage_key(&mut conn, "b", None, b"1", 10).unwrap();
        clear_storage_key(&mut conn, "a", None, 20).unwrap();

        let keys = list_storage_keys(&conn).unwrap();
        assert_eq!(
            keys,
            vec![
                KeyInfo {
                    grain_key: "a".into(),
                    version: 1,
                    has_payload: false,
                    updated_at: 20
                },
                KeyInfo {
                    grain_key: "b".into(),
                    version: 1,
                    has_payload: true,
                    updated_at: 10
                },
            ]
        );
    }
}
