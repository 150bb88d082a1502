//! Schema versions for the state database.
//!
//! `PRAGMA user_version` records the last applied step. Each step runs in
//! its own transaction together with the version bump, so a crash never
//! leaves a half-applied step behind.

use rusqlite::Connection;

use super::error::DatabaseError;

/// Ordered schema steps; step `n` (1-based) brings the schema to version `n`.
const STEPS: &[(&str, &str)] = &[(
    "kv_store table",
    include_str!("sql/001_create_kv_store.sql"),
)];

fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Applies every step above the stored schema version. Returns how many
/// steps ran.
pub fn apply_pending(conn: &mut Connection) -> Result<usize, DatabaseError> {
    let current = schema_version(conn)?;
    let mut applied = 0;

    for (index, (name, sql)) in STEPS.iter().enumerate() {
        let version = index as u32 + 1;
        if version <= current {
            continue;
        }

        log::info!("Migrating state schema to v{} ({})", version, name);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .and_then(|_| tx.pragma_update(None, "user_version", version))
            .map_err(|e| DatabaseError::Migration {
                version,
                reason: e.to_string(),
            })?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_db_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_pending(&mut conn).unwrap(), STEPS.len());
        assert_eq!(schema_version(&conn).unwrap(), STEPS.len() as u32);
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();
        assert_eq!(apply_pending(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_kv_store_table_exists() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('a', '{}', '2026-01-01')",
            [],
        )
        .unwrap();
    }
}
