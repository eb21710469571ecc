use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

use super::{date_at, date_str};
use crate::model::DayNote;
use crate::Result;

pub fn get(conn: &Connection, user_id: Uuid, date: NaiveDate) -> Result<Option<DayNote>> {
    Ok(conn
        .query_row(
            "SELECT due_date, issue, memo FROM day_notes WHERE user_id = ?1 AND due_date = ?2",
            params![user_id.to_string(), date_str(date)],
            |row| {
                Ok(DayNote {
                    due_date: date_at(row, 0)?,
                    issue: row.get(1)?,
                    memo: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn upsert(conn: &Connection, user_id: Uuid, note: &DayNote) -> Result<()> {
    conn.execute(
        "INSERT INTO day_notes (user_id, due_date, issue, memo) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, due_date) DO UPDATE SET issue = excluded.issue, memo = excluded.memo",
        params![user_id.to_string(), date_str(note.due_date), note.issue, note.memo],
    )?;
    Ok(())
}

/// Notes within `[from, to]` keyed by day.
pub fn list_between(
    conn: &Connection,
    user_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashMap<NaiveDate, DayNote>> {
    let mut stmt = conn.prepare(
        "SELECT due_date, issue, memo FROM day_notes
         WHERE user_id = ?1 AND due_date >= ?2 AND due_date <= ?3",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), date_str(from), date_str(to)], |row| {
        Ok(DayNote {
            due_date: date_at(row, 0)?,
            issue: row.get(1)?,
            memo: row.get(2)?,
        })
    })?;
    let mut out = HashMap::new();
    for note in rows {
        let note = note?;
        out.insert(note.due_date, note);
    }
    Ok(out)
}

pub fn list_all(conn: &Connection, user_id: Uuid) -> Result<Vec<DayNote>> {
    let mut stmt = conn.prepare(
        "SELECT due_date, issue, memo FROM day_notes WHERE user_id = ?1 ORDER BY due_date ASC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(DayNote {
            due_date: date_at(row, 0)?,
            issue: row.get(1)?,
            memo: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_all_for_user(conn: &Connection, user_id: Uuid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM day_notes WHERE user_id = ?1",
        params![user_id.to_string()],
    )?)
}
