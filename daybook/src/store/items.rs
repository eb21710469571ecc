use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use uuid::Uuid;

use super::{date_str, like_pattern, now, opt_date_at, opt_uuid_at, tags, time_at, to_micros, uuid_at};
use crate::model::{ItemStatus, TemplateType, WorkspaceItem};
use crate::{Error, Result};

const COLUMNS: &str =
    "id, user_id, parent_id, title, status, due_date, template_type, created_at, updated_at";

/// Ordering used by keyword search and migration anchors.
const DATE_DESC: &str = "due_date IS NULL, due_date DESC, updated_at DESC";

fn from_row(row: &Row<'_>) -> rusqlite::Result<WorkspaceItem> {
    let status: String = row.get(4)?;
    let template: String = row.get(6)?;
    Ok(WorkspaceItem {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        parent_id: opt_uuid_at(row, 2)?,
        title: row.get(3)?,
        status: ItemStatus::parse(&status).unwrap_or_default(),
        due_date: opt_date_at(row, 5)?,
        template_type: TemplateType::normalize(Some(&template)),
        tag_ids: Vec::new(),
        created_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

fn query(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<WorkspaceItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, from_row)?;
    let mut items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    attach_tags(conn, &mut items)?;
    Ok(items)
}

fn attach_tags(conn: &Connection, items: &mut [WorkspaceItem]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let mut by_item = tags::tag_ids_for_items(conn, &ids)?;
    for item in items.iter_mut() {
        item.tag_ids = by_item.remove(&item.id).unwrap_or_default();
    }
    Ok(())
}

pub fn insert(conn: &Connection, item: &WorkspaceItem) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO workspace_items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", COLUMNS),
        params![
            item.id.to_string(),
            item.user_id.to_string(),
            item.parent_id.map(|p| p.to_string()),
            item.title,
            item.status.as_str(),
            item.due_date.map(date_str),
            item.template_type.as_str(),
            to_micros(item.created_at),
            to_micros(item.updated_at),
        ],
    )?;
    Ok(())
}

/// Persist every mutable column and bump `updated_at`.
pub fn update(conn: &Connection, item: &mut WorkspaceItem) -> Result<()> {
    item.updated_at = now();
    conn.execute(
        "UPDATE workspace_items
         SET parent_id = ?2, title = ?3, status = ?4, due_date = ?5, template_type = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            item.id.to_string(),
            item.parent_id.map(|p| p.to_string()),
            item.title,
            item.status.as_str(),
            item.due_date.map(date_str),
            item.template_type.as_str(),
            to_micros(item.updated_at),
        ],
    )?;
    Ok(())
}

pub fn touch(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE workspace_items SET updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), to_micros(now())],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, id: Uuid) -> Result<Option<WorkspaceItem>> {
    let item = conn
        .query_row(
            &format!("SELECT {} FROM workspace_items WHERE id = ?1", COLUMNS),
            params![id.to_string()],
            from_row,
        )
        .optional()?;
    match item {
        Some(item) => {
            let mut items = [item];
            attach_tags(conn, &mut items)?;
            let [item] = items;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

/// Load an item and verify it belongs to `user_id`.
pub fn find_owned(conn: &Connection, user_id: Uuid, id: Uuid) -> Result<WorkspaceItem> {
    let item = find(conn, id)?.ok_or_else(|| Error::NotFound(format!("item {}", id)))?;
    if item.user_id != user_id {
        return Err(Error::Forbidden(format!("item {} belongs to another user", id)));
    }
    Ok(item)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let changed = conn.execute("DELETE FROM workspace_items WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}

pub fn delete_all_for_user(conn: &Connection, user_id: Uuid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM workspace_items WHERE user_id = ?1",
        params![user_id.to_string()],
    )?)
}

pub fn list_by_user(conn: &Connection, user_id: Uuid) -> Result<Vec<WorkspaceItem>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM workspace_items WHERE user_id = ?1 ORDER BY updated_at DESC",
            COLUMNS
        ),
        &[&user_id.to_string()],
    )
}

pub fn list_by_date(conn: &Connection, user_id: Uuid, date: NaiveDate) -> Result<Vec<WorkspaceItem>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM workspace_items WHERE user_id = ?1 AND due_date = ?2 ORDER BY updated_at DESC",
            COLUMNS
        ),
        &[&user_id.to_string(), &date_str(date)],
    )
}

/// Items due within `[from, to]`, newest date first.
pub fn list_between(
    conn: &Connection,
    user_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<WorkspaceItem>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM workspace_items
             WHERE user_id = ?1 AND due_date >= ?2 AND due_date <= ?3
             ORDER BY due_date DESC, updated_at DESC",
            COLUMNS
        ),
        &[&user_id.to_string(), &date_str(from), &date_str(to)],
    )
}

/// Title or block content contains `keyword`; optional day filter.
pub fn search(
    conn: &Connection,
    user_id: Uuid,
    keyword: &str,
    date: Option<NaiveDate>,
) -> Result<Vec<WorkspaceItem>> {
    let pattern = like_pattern(keyword);
    let sql = format!(
        "SELECT {} FROM workspace_items i
         WHERE i.user_id = ?1
           AND (?3 IS NULL OR i.due_date = ?3)
           AND (lower(i.title) LIKE lower(?2) ESCAPE '\\'
                OR EXISTS (SELECT 1 FROM blocks b WHERE b.item_id = i.id AND b.content LIKE ?2 ESCAPE '\\'))
         ORDER BY {}",
        COLUMNS, DATE_DESC
    );
    query(
        conn,
        &sql,
        &[&user_id.to_string(), &pattern, &date.map(date_str)],
    )
}

pub fn recent(conn: &Connection, user_id: Uuid, limit: usize) -> Result<Vec<WorkspaceItem>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM workspace_items WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
            COLUMNS
        ),
        &[&user_id.to_string(), &(limit as i64)],
    )
}

/// Most recently updated item per due date.
pub fn latest_by_due_date(conn: &Connection, user_id: Uuid) -> Result<HashMap<NaiveDate, Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT due_date, id FROM workspace_items
         WHERE user_id = ?1 AND due_date IS NOT NULL
         ORDER BY updated_at ASC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok((super::date_at(row, 0)?, uuid_at(row, 1)?))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (date, id) = row?;
        // Later rows are newer and win.
        out.insert(date, id);
    }
    Ok(out)
}

/// Per-item block and file counts for the admin view.
pub fn list_with_counts(conn: &Connection, user_id: Uuid) -> Result<Vec<(WorkspaceItem, i64, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {},
                (SELECT COUNT(*) FROM blocks b WHERE b.item_id = workspace_items.id),
                (SELECT COUNT(*) FROM file_assets f WHERE f.item_id = workspace_items.id)
         FROM workspace_items WHERE user_id = ?1 ORDER BY updated_at DESC",
        COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok((from_row(row)?, row.get::<_, i64>(9)?, row.get::<_, i64>(10)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM workspace_items", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockPayload;
    use crate::store::{blocks, test_support, Store};

    fn item(user: Uuid, title: &str, due: Option<&str>) -> WorkspaceItem {
        let mut item = WorkspaceItem::new(user, title);
        item.due_date = due.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap());
        item
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let store = Store::in_memory().unwrap();
        let mut it = store
            .write(|tx| {
                let user = test_support::user(tx, "a@example.com");
                let it = item(user.id, "first", Some("2024-05-01"));
                insert(tx, &it)?;
                Ok(it)
            })
            .await
            .unwrap();

        it.status = ItemStatus::Done;
        it.title = "renamed".into();
        let before = it.updated_at;
        store.write(|tx| update(tx, &mut it)).await.unwrap();
        assert!(it.updated_at > before);

        let found = store.read(|c| find(c, it.id)).await.unwrap().unwrap();
        assert_eq!(found.title, "renamed");
        assert_eq!(found.status, ItemStatus::Done);
        assert_eq!(found.due_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[tokio::test]
    async fn test_find_owned_other_user_forbidden() {
        let store = Store::in_memory().unwrap();
        let (other, it) = store
            .write(|tx| {
                let owner = test_support::user(tx, "owner@example.com");
                let other = test_support::user(tx, "other@example.com");
                let it = item(owner.id, "mine", None);
                insert(tx, &it)?;
                Ok((other, it))
            })
            .await
            .unwrap();

        let result = store.read(|c| find_owned(c, other.id, it.id)).await;
        assert!(matches!(result, Err(Error::Forbidden(_))));

        let missing = store.read(|c| find_owned(c, other.id, Uuid::new_v4())).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_title_and_content_sorted() {
        let store = Store::in_memory().unwrap();
        let user = store
            .write(|tx| {
                let user = test_support::user(tx, "s@example.com");
                let a = item(user.id, "Weekly meeting", Some("2024-01-02"));
                let b = item(user.id, "undated meeting", None);
                let c = item(user.id, "plain", Some("2024-03-01"));
                let d = item(user.id, "other", Some("2024-02-01"));
                for it in [&a, &b, &c, &d] {
                    insert(tx, it)?;
                }
                blocks::replace(tx, c.id, &[BlockPayload::html(0, "<p>project meeting notes</p>")])?;
                Ok(user)
            })
            .await
            .unwrap();

        let found = store
            .read(|c| search(c, user.id, "MEETING", None))
            .await
            .unwrap();
        let titles: Vec<&str> = found.iter().map(|i| i.title.as_str()).collect();
        // Content match is case-insensitive for ASCII as well.
        assert_eq!(titles, vec!["plain", "Weekly meeting", "undated meeting"]);

        let on_day = store
            .read(|c| search(c, user.id, "meeting", NaiveDate::from_ymd_opt(2024, 1, 2)))
            .await
            .unwrap();
        assert_eq!(on_day.len(), 1);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = Store::in_memory().unwrap();
        let user = store
            .write(|tx| {
                let user = test_support::user(tx, "w@example.com");
                insert(tx, &item(user.id, "100% done", None))?;
                insert(tx, &item(user.id, "100 done", None))?;
                Ok(user)
            })
            .await
            .unwrap();
        let found = store.read(|c| search(c, user.id, "0%", None)).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_by_due_date_prefers_newest() {
        let store = Store::in_memory().unwrap();
        let (user, newer) = store
            .write(|tx| {
                let user = test_support::user(tx, "l@example.com");
                let older = item(user.id, "older", Some("2024-04-04"));
                insert(tx, &older)?;
                let newer = item(user.id, "newer", Some("2024-04-04"));
                insert(tx, &newer)?;
                Ok((user, newer))
            })
            .await
            .unwrap();
        let map = store.read(|c| latest_by_due_date(c, user.id)).await.unwrap();
        assert_eq!(map.get(&NaiveDate::from_ymd_opt(2024, 4, 4).unwrap()), Some(&newer.id));
    }

    #[tokio::test]
    async fn test_between_and_recent() {
        let store = Store::in_memory().unwrap();
        let user = store
            .write(|tx| {
                let user = test_support::user(tx, "b@example.com");
                insert(tx, &item(user.id, "march", Some("2024-03-31")))?;
                insert(tx, &item(user.id, "april-1", Some("2024-04-01")))?;
                insert(tx, &item(user.id, "april-30", Some("2024-04-30")))?;
                insert(tx, &item(user.id, "none", None))?;
                Ok(user)
            })
            .await
            .unwrap();
        let april = store
            .read(|c| {
                list_between(
                    c,
                    user.id,
                    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
                )
            })
            .await
            .unwrap();
        let titles: Vec<&str> = april.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["april-30", "april-1"]);

        let recent = store.read(|c| recent(c, user.id, 2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].title, "none");
    }
}
