use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{from_micros, now, time_at, to_micros, uuid_at};
use crate::model::{Role, User};
use crate::Result;

const COLUMNS: &str = "id, email, nickname, password_hash, role, failed_login_count, \
                       locked_until, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let locked: Option<i64> = row.get(6)?;
    Ok(User {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        nickname: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role).unwrap_or_default(),
        failed_login_count: row.get(5)?,
        locked_until: locked.map(from_micros),
        created_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

pub fn insert(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", COLUMNS),
        params![
            user.id.to_string(),
            user.email,
            user.nickname,
            user.password_hash,
            user.role.as_str(),
            user.failed_login_count,
            user.locked_until.map(to_micros),
            to_micros(user.created_at),
            to_micros(user.updated_at),
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", COLUMNS),
            params![id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", COLUMNS),
            params![email],
            from_row,
        )
        .optional()?)
}

/// Every account with its item count, oldest first.
pub fn list_with_item_counts(conn: &Connection) -> Result<Vec<(User, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, (SELECT COUNT(*) FROM workspace_items i WHERE i.user_id = users.id)
         FROM users ORDER BY created_at ASC",
        COLUMNS
    ))?;
    let rows = stmt.query_map([], |row| Ok((from_row(row)?, row.get::<_, i64>(9)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update_role(conn: &Connection, id: Uuid, role: Role) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), role.as_str(), to_micros(now())],
    )?;
    Ok(changed > 0)
}

pub fn update_password(conn: &Connection, id: Uuid, password_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), password_hash, to_micros(now())],
    )?;
    Ok(())
}

pub fn set_login_state(
    conn: &Connection,
    id: Uuid,
    failed_login_count: u32,
    locked_until: Option<DateTime<Utc>>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET failed_login_count = ?2, locked_until = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            id.to_string(),
            failed_login_count,
            locked_until.map(to_micros),
            to_micros(now())
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
}
