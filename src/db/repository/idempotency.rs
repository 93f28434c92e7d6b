use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;

/// Response recorded for a completed keyed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub operation: String,
    pub response: String,
}

pub fn get_stored_response(
    conn: &Connection,
    key: &str,
) -> Result<Option<StoredResponse>, DatabaseError> {
    let stored = conn
        .query_row(
            "SELECT operation, response FROM idempotency_keys WHERE key = ?1",
            params![key],
            |row| {
                Ok(StoredResponse {
                    operation: row.get(0)?,
                    response: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(stored)
}

/// Fails with a unique-constraint error when the key is already recorded.
pub fn insert_stored_response(
    conn: &Connection,
    key: &str,
    operation: &str,
    response: &str,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO idempotency_keys (key, operation, response, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![key, operation, response, now],
    )?;
    Ok(())
}
