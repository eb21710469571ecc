use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{from_micros, to_micros};
use crate::Result;

/// Hex SHA-256 of a refresh token. Only digests reach the database.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// One active refresh token per user; storing a new one rotates the old out.
pub fn store(conn: &Connection, user_id: Uuid, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET token_hash = excluded.token_hash, expires_at = excluded.expires_at",
        params![user_id.to_string(), digest(token), to_micros(expires_at)],
    )?;
    Ok(())
}

/// Stored digest and expiry of the user's refresh token.
pub fn find(conn: &Connection, user_id: Uuid) -> Result<Option<(String, DateTime<Utc>)>> {
    Ok(conn
        .query_row(
            "SELECT token_hash, expires_at FROM refresh_tokens WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, from_micros(row.get(1)?))),
        )
        .optional()?)
}

pub fn delete(conn: &Connection, user_id: Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM refresh_tokens WHERE user_id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(())
}
