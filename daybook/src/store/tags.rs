use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

use super::uuid_at;
use crate::model::Tag;
use crate::{Error, Result};

pub fn insert(conn: &Connection, user_id: Uuid, tag: &Tag) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (id, user_id, name) VALUES (?1, ?2, ?3)",
        params![tag.id.to_string(), user_id.to_string(), tag.name],
    )?;
    Ok(())
}

pub fn find_by_name(conn: &Connection, user_id: Uuid, name: &str) -> Result<Option<Tag>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM tags WHERE user_id = ?1 AND name = ?2",
            params![user_id.to_string(), name],
            |row| Ok(Tag { id: uuid_at(row, 0)?, name: row.get(1)? }),
        )
        .optional()?)
}

pub fn list(conn: &Connection, user_id: Uuid) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags WHERE user_id = ?1 ORDER BY name ASC")?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(Tag { id: uuid_at(row, 0)?, name: row.get(1)? })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Replace the tag set of an item. Every tag must belong to `user_id`.
pub fn set_item_tags(conn: &Connection, user_id: Uuid, item_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
    let owned: HashMap<Uuid, Tag> = list(conn, user_id)?.into_iter().map(|t| (t.id, t)).collect();
    if let Some(unknown) = tag_ids.iter().find(|id| !owned.contains_key(id)) {
        return Err(Error::Validation(format!("unknown tag {}", unknown)));
    }
    conn.execute("DELETE FROM item_tags WHERE item_id = ?1", params![item_id.to_string()])?;
    for tag_id in tag_ids {
        conn.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2)",
            params![item_id.to_string(), tag_id.to_string()],
        )?;
    }
    Ok(())
}

pub fn tag_ids_for_items(conn: &Connection, item_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
    let mut out: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut stmt = conn.prepare_cached(
        "SELECT it.tag_id FROM item_tags it JOIN tags t ON t.id = it.tag_id
         WHERE it.item_id = ?1 ORDER BY t.name ASC",
    )?;
    for item_id in item_ids {
        let rows = stmt.query_map(params![item_id.to_string()], |row| uuid_at(row, 0))?;
        let ids = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        if !ids.is_empty() {
            out.insert(*item_id, ids);
        }
    }
    Ok(out)
}

pub fn names_for_item(conn: &Connection, item_id: Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM item_tags it JOIN tags t ON t.id = it.tag_id
         WHERE it.item_id = ?1 ORDER BY t.name ASC",
    )?;
    let rows = stmt.query_map(params![item_id.to_string()], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Look up a tag by name, creating it when missing.
pub fn ensure(conn: &Connection, user_id: Uuid, name: &str) -> Result<Tag> {
    if let Some(tag) = find_by_name(conn, user_id, name)? {
        return Ok(tag);
    }
    let tag = Tag { id: Uuid::new_v4(), name: name.to_string() };
    insert(conn, user_id, &tag)?;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceItem;
    use crate::store::{items, test_support, Store};

    #[tokio::test]
    async fn test_set_item_tags_replaces() {
        let store = Store::in_memory().unwrap();
        let (item_id, a, b) = store
            .write(|tx| {
                let user = test_support::user(tx, "t@example.com");
                let item = WorkspaceItem::new(user.id, "tagged");
                items::insert(tx, &item)?;
                let a = ensure(tx, user.id, "alpha")?;
                let b = ensure(tx, user.id, "beta")?;
                set_item_tags(tx, user.id, item.id, &[a.id])?;
                set_item_tags(tx, user.id, item.id, &[b.id, a.id])?;
                Ok((item.id, a, b))
            })
            .await
            .unwrap();

        let found = store.read(|c| items::find(c, item_id)).await.unwrap().unwrap();
        assert_eq!(found.tag_ids, vec![a.id, b.id]);
        let names = store.read(|c| names_for_item(c, item_id)).await.unwrap();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_foreign_tag_rejected() {
        let store = Store::in_memory().unwrap();
        let result = store
            .write(|tx| {
                let owner = test_support::user(tx, "o@example.com");
                let other = test_support::user(tx, "x@example.com");
                let item = WorkspaceItem::new(owner.id, "mine");
                items::insert(tx, &item)?;
                let foreign = ensure(tx, other.id, "theirs")?;
                set_item_tags(tx, owner.id, item.id, &[foreign.id])
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
