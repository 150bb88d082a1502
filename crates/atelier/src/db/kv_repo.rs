//! Key-value repository: CRUD operations for the `kv_store` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// Returns the value stored under `key`, if any.
pub fn get(db: &Database, key: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    })
}

/// Inserts or fully replaces the value stored under `key`.
pub fn put(db: &Database, key: &str, value: &str) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    })
}

/// Deletes the value stored under `key`. Returns whether a row was removed.
pub fn delete(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    })
}
