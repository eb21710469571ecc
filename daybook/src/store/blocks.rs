use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::uuid_at;
use crate::model::{Block, BlockPayload};
use crate::Result;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        id: uuid_at(row, 0)?,
        item_id: uuid_at(row, 1)?,
        sort_order: row.get(2)?,
        block_type: row.get(3)?,
        content: row.get(4)?,
    })
}

pub fn list(conn: &Connection, item_id: Uuid) -> Result<Vec<Block>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, sort_order, block_type, content FROM blocks
         WHERE item_id = ?1 ORDER BY sort_order ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![item_id.to_string()], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The block carrying the rendered document.
pub fn first(conn: &Connection, item_id: Uuid) -> Result<Option<Block>> {
    Ok(conn
        .query_row(
            "SELECT id, item_id, sort_order, block_type, content FROM blocks
             WHERE item_id = ?1 ORDER BY sort_order ASC, rowid ASC LIMIT 1",
            params![item_id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn insert(conn: &Connection, item_id: Uuid, payload: &BlockPayload) -> Result<Block> {
    let block = Block {
        id: Uuid::new_v4(),
        item_id,
        sort_order: payload.sort_order,
        block_type: if payload.block_type.trim().is_empty() {
            "paragraph".to_string()
        } else {
            payload.block_type.clone()
        },
        content: payload.content.clone(),
    };
    conn.execute(
        "INSERT INTO blocks (id, item_id, sort_order, block_type, content) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            block.id.to_string(),
            item_id.to_string(),
            block.sort_order,
            block.block_type,
            block.content
        ],
    )?;
    Ok(block)
}

/// Drop every block of the item and insert the given ones.
pub fn replace(conn: &Connection, item_id: Uuid, payloads: &[BlockPayload]) -> Result<Vec<Block>> {
    conn.execute("DELETE FROM blocks WHERE item_id = ?1", params![item_id.to_string()])?;
    payloads.iter().map(|p| insert(conn, item_id, p)).collect()
}

pub fn update_content(conn: &Connection, block_id: Uuid, content: &str) -> Result<()> {
    conn.execute(
        "UPDATE blocks SET content = ?2 WHERE id = ?1",
        params![block_id.to_string(), content],
    )?;
    Ok(())
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM blocks", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceItem;
    use crate::store::{items, test_support, Store};

    #[tokio::test]
    async fn test_replace_orders_and_defaults_type() {
        let store = Store::in_memory().unwrap();
        let item_id = store
            .write(|tx| {
                let user = test_support::user(tx, "blk@example.com");
                let item = WorkspaceItem::new(user.id, "doc");
                items::insert(tx, &item)?;
                replace(tx, item.id, &[BlockPayload::html(0, "old")])?;
                let second = BlockPayload {
                    id: None,
                    sort_order: 2,
                    block_type: "  ".into(),
                    content: "{\"html\":\"b\"}".into(),
                };
                replace(tx, item.id, &[second, BlockPayload::html(1, "a")])?;
                Ok(item.id)
            })
            .await
            .unwrap();

        let blocks = store.read(|c| list(c, item_id)).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].sort_order, 1);
        assert_eq!(blocks[1].block_type, "paragraph");

        let first_block = store.read(|c| first(c, item_id)).await.unwrap().unwrap();
        assert!(first_block.content.contains("\"a\""));
    }

    #[tokio::test]
    async fn test_blocks_cascade_with_item() {
        let store = Store::in_memory().unwrap();
        let item_id = store
            .write(|tx| {
                let user = test_support::user(tx, "c@example.com");
                let item = WorkspaceItem::new(user.id, "doc");
                items::insert(tx, &item)?;
                insert(tx, item.id, &BlockPayload::html(0, "x"))?;
                Ok(item.id)
            })
            .await
            .unwrap();
        store.write(|tx| items::delete(tx, item_id)).await.unwrap();
        assert_eq!(store.read(|c| count(c)).await.unwrap(), 0);
    }
}
