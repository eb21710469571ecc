use daybook_storage::StoredName;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{time_at, to_micros, uuid_at};
use crate::model::FileAsset;
use crate::Result;

const COLUMNS: &str =
    "id, user_id, item_id, original_name, stored_name, mime_type, size_bytes, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<FileAsset> {
    let stored: String = row.get(4)?;
    Ok(FileAsset {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        item_id: uuid_at(row, 2)?,
        original_name: row.get(3)?,
        stored_name: StoredName::parse(&stored).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        mime_type: row.get(5)?,
        size_bytes: row.get(6)?,
        created_at: time_at(row, 7)?,
    })
}

fn query(conn: &Connection, sql: &str, arg: &str) -> Result<Vec<FileAsset>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![arg], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert(conn: &Connection, asset: &FileAsset) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO file_assets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
        params![
            asset.id.to_string(),
            asset.user_id.to_string(),
            asset.item_id.to_string(),
            asset.original_name,
            asset.stored_name.as_str(),
            asset.mime_type,
            asset.size_bytes,
            to_micros(asset.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_by_item(conn: &Connection, item_id: Uuid) -> Result<Vec<FileAsset>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM file_assets WHERE item_id = ?1 ORDER BY created_at DESC",
            COLUMNS
        ),
        &item_id.to_string(),
    )
}

pub fn list_by_user(conn: &Connection, user_id: Uuid) -> Result<Vec<FileAsset>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM file_assets WHERE user_id = ?1 ORDER BY created_at ASC",
            COLUMNS
        ),
        &user_id.to_string(),
    )
}

pub fn find_by_stored_name(conn: &Connection, name: &StoredName) -> Result<Option<FileAsset>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM file_assets WHERE stored_name = ?1", COLUMNS),
            params![name.as_str()],
            from_row,
        )
        .optional()?)
}

/// Blob names to clean up after the item rows are gone.
pub fn stored_names_for_item(conn: &Connection, item_id: Uuid) -> Result<Vec<StoredName>> {
    Ok(list_by_item(conn, item_id)?
        .into_iter()
        .map(|f| f.stored_name)
        .collect())
}

pub fn stored_names_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<StoredName>> {
    Ok(list_by_user(conn, user_id)?
        .into_iter()
        .map(|f| f.stored_name)
        .collect())
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM file_assets", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceItem;
    use crate::store::{items, now, test_support, Store};

    #[tokio::test]
    async fn test_insert_list_find() {
        let store = Store::in_memory().unwrap();
        let asset = store
            .write(|tx| {
                let user = test_support::user(tx, "f@example.com");
                let item = WorkspaceItem::new(user.id, "with file");
                items::insert(tx, &item)?;
                let asset = FileAsset {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    item_id: item.id,
                    original_name: "shot.png".into(),
                    stored_name: StoredName::generate(Some("png")),
                    mime_type: "image/png".into(),
                    size_bytes: 42,
                    created_at: now(),
                };
                insert(tx, &asset)?;
                Ok(asset)
            })
            .await
            .unwrap();

        let listed = store.read(|c| list_by_item(c, asset.item_id)).await.unwrap();
        assert_eq!(listed, vec![asset.clone()]);

        let found = store
            .read(|c| find_by_stored_name(c, &asset.stored_name))
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(asset.id));
        assert_eq!(asset.url(), format!("/files/{}", asset.stored_name));
    }
}
