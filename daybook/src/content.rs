//! Ordered content blocks of an item.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::model::{Block, BlockPayload};
use crate::store::{blocks, items, Store};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBlocks {
    pub item_id: Uuid,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaceBlocks {
    #[serde(default)]
    pub blocks: Vec<BlockPayload>,
}

pub struct ContentService {
    store: Arc<Store>,
}

impl ContentService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: Uuid, item_id: Uuid) -> Result<ItemBlocks> {
        let blocks = self
            .store
            .read(|c| {
                items::find_owned(c, user_id, item_id)?;
                blocks::list(c, item_id)
            })
            .await?;
        Ok(ItemBlocks { item_id, blocks })
    }

    /// Replace every block of the item and bump its `updatedAt`.
    pub async fn replace(&self, user_id: Uuid, item_id: Uuid, request: ReplaceBlocks) -> Result<ItemBlocks> {
        let blocks = self
            .store
            .write(|tx| {
                items::find_owned(tx, user_id, item_id)?;
                let saved = blocks::replace(tx, item_id, &request.blocks)?;
                items::touch(tx, item_id)?;
                Ok(saved)
            })
            .await?;
        Ok(ItemBlocks { item_id, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceItem;
    use crate::store::test_support;
    use crate::Error;

    #[tokio::test]
    async fn test_replace_orders_and_touches() {
        let store = Arc::new(Store::in_memory().unwrap());
        let (user, item) = store
            .write(|tx| {
                let user = test_support::user(tx, "content@example.com");
                let item = WorkspaceItem::new(user.id, "Doc");
                items::insert(tx, &item)?;
                Ok((user, item))
            })
            .await
            .unwrap();
        let service = ContentService::new(store.clone());

        let request = ReplaceBlocks {
            blocks: vec![
                BlockPayload { id: None, sort_order: 2, block_type: "".into(), content: "{}".into() },
                BlockPayload::html(1, "<p>first</p>"),
            ],
        };
        let saved = service.replace(user.id, item.id, request).await.unwrap();
        assert_eq!(saved.blocks.len(), 2);

        let fetched = service.get(user.id, item.id).await.unwrap();
        assert_eq!(fetched.blocks[0].sort_order, 1);
        assert_eq!(fetched.blocks[1].block_type, "paragraph");

        let after = store.read(|c| items::find(c, item.id)).await.unwrap().unwrap();
        assert!(after.updated_at > item.updated_at);

        let empty = service
            .replace(user.id, item.id, ReplaceBlocks::default())
            .await
            .unwrap();
        assert!(empty.blocks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let store = Arc::new(Store::in_memory().unwrap());
        let user = store
            .write(|tx| Ok(test_support::user(tx, "c2@example.com")))
            .await
            .unwrap();
        let service = ContentService::new(store);
        assert!(matches!(
            service.get(user.id, Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }
}
