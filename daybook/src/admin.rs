//! Cross-user administration and the startup admin seed.

use chrono::{DateTime, NaiveDate, Utc};
use daybook_storage::BlobStorage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::Passwords;
use crate::config::AdminConfig;
use crate::model::{Block, BlockPayload, DayNote, ItemStatus, Role, TemplateType, User, WorkspaceItem};
use crate::store::{self, blocks, day_notes, files, items, users, Store};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: i64,
    pub total_items: i64,
    pub total_blocks: i64,
    pub total_files: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub item_count: i64,
}

impl AdminUser {
    fn new(user: User, item_count: i64) -> Self {
        Self {
            id: user.id,
            email: user.email,
            nickname: user.nickname,
            role: user.role,
            failed_login_count: user.failed_login_count,
            locked_until: user.locked_until,
            created_at: user.created_at,
            item_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminItem {
    pub id: Uuid,
    pub title: String,
    pub status: ItemStatus,
    pub due_date: Option<NaiveDate>,
    pub template_type: TemplateType,
    pub updated_at: DateTime<Utc>,
    pub block_count: i64,
    pub file_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminItemBlocks {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub title: String,
    pub status: ItemStatus,
    pub due_date: Option<NaiveDate>,
    pub template_type: TemplateType,
    pub html: String,
    pub issue: String,
    pub memo: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetailUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub template_type: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub role: Option<String>,
}

fn user_not_found(id: Uuid) -> Error {
    Error::NotFound(format!("user {}", id))
}

/// Item lookup scoped to the user named in the path.
fn item_of(conn: &rusqlite::Connection, user_id: Uuid, item_id: Uuid) -> Result<WorkspaceItem> {
    let item = items::find(conn, item_id)?.ok_or_else(|| Error::NotFound(format!("item {}", item_id)))?;
    if item.user_id != user_id {
        return Err(Error::BadRequest(format!(
            "item {} does not belong to user {}",
            item_id, user_id
        )));
    }
    Ok(item)
}

fn html_of(block: Option<&Block>) -> String {
    block
        .and_then(|b| serde_json::from_str::<Value>(&b.content).ok())
        .and_then(|v| v.get("html").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

pub struct AdminService {
    store: Arc<Store>,
    storage: Arc<dyn BlobStorage>,
    passwords: Passwords,
}

impl AdminService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn BlobStorage>, passwords: Passwords) -> Self {
        Self { store, storage, passwords }
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.store
            .read(|c| {
                Ok(Stats {
                    total_users: users::count(c)?,
                    total_items: items::count(c)?,
                    total_blocks: blocks::count(c)?,
                    total_files: files::count(c)?,
                })
            })
            .await
    }

    pub async fn users(&self) -> Result<Vec<AdminUser>> {
        let rows = self.store.read(users::list_with_item_counts).await?;
        Ok(rows.into_iter().map(|(u, n)| AdminUser::new(u, n)).collect())
    }

    pub async fn user_items(&self, user_id: Uuid) -> Result<Vec<AdminItem>> {
        let rows = self
            .store
            .read(|c| {
                users::find_by_id(c, user_id)?.ok_or_else(|| user_not_found(user_id))?;
                items::list_with_counts(c, user_id)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(item, block_count, file_count)| AdminItem {
                id: item.id,
                title: item.title,
                status: item.status,
                due_date: item.due_date,
                template_type: item.template_type,
                updated_at: item.updated_at,
                block_count,
                file_count,
            })
            .collect())
    }

    pub async fn item_blocks(&self, user_id: Uuid, item_id: Uuid) -> Result<AdminItemBlocks> {
        let blocks = self
            .store
            .read(|c| {
                item_of(c, user_id, item_id)?;
                blocks::list(c, item_id)
            })
            .await?;
        Ok(AdminItemBlocks { user_id, item_id, blocks })
    }

    pub async fn update_role(&self, user_id: Uuid, update: RoleUpdate) -> Result<AdminUser> {
        let raw = update.role.unwrap_or_else(|| Role::User.as_str().to_string());
        let role = Role::parse(&raw)
            .ok_or_else(|| Error::Validation("role must be USER or ADMIN".to_string()))?;
        let (user, count) = self
            .store
            .write(|tx| {
                if !users::update_role(tx, user_id, role)? {
                    return Err(user_not_found(user_id));
                }
                let user = users::find_by_id(tx, user_id)?.ok_or_else(|| user_not_found(user_id))?;
                let count = items::list_by_user(tx, user_id)?.len() as i64;
                Ok((user, count))
            })
            .await?;
        info!(user = %user_id, role = %role, "Changed user role");
        Ok(AdminUser::new(user, count))
    }

    pub async fn unlock(&self, user_id: Uuid) -> Result<()> {
        let found = self
            .store
            .write(|tx| users::set_login_state(tx, user_id, 0, None))
            .await?;
        if !found {
            return Err(user_not_found(user_id));
        }
        Ok(())
    }

    /// Delete an account with everything it owns, blobs included.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let stored = self
            .store
            .write(|tx| {
                let stored = files::stored_names_for_user(tx, user_id)?;
                if !users::delete(tx, user_id)? {
                    return Err(user_not_found(user_id));
                }
                Ok(stored)
            })
            .await?;
        self.storage.delete_many(&stored).await;
        info!(user = %user_id, files = stored.len(), "Deleted user");
        Ok(())
    }

    pub async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        let stored = self
            .store
            .write(|tx| {
                item_of(tx, user_id, item_id)?;
                let stored = files::stored_names_for_item(tx, item_id)?;
                items::delete(tx, item_id)?;
                Ok(stored)
            })
            .await?;
        self.storage.delete_many(&stored).await;
        Ok(())
    }

    pub async fn item_detail(&self, user_id: Uuid, item_id: Uuid) -> Result<ItemDetail> {
        self.store
            .read(|c| {
                let item = item_of(c, user_id, item_id)?;
                let html = html_of(blocks::first(c, item_id)?.as_ref());
                let note = match item.due_date {
                    Some(date) => day_notes::get(c, user_id, date)?,
                    None => None,
                };
                let (issue, memo) = note.map(|n| (n.issue, n.memo)).unwrap_or_default();
                Ok(ItemDetail {
                    user_id,
                    item_id,
                    title: item.title,
                    status: item.status,
                    due_date: item.due_date,
                    template_type: item.template_type,
                    html,
                    issue,
                    memo,
                })
            })
            .await
    }

    /// Overwrite the item with a single `{html}` block; dated items also get their day note replaced.
    pub async fn update_item_detail(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        update: ItemDetailUpdate,
    ) -> Result<ItemDetail> {
        let status = match update.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                ItemStatus::parse(raw)
                    .ok_or_else(|| Error::Validation(format!("invalid status '{}'", raw)))?,
            ),
            None => None,
        };
        self.store
            .write(|tx| {
                let mut item = item_of(tx, user_id, item_id)?;
                if let Some(title) = update.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                    item.title = title.to_string();
                }
                if let Some(status) = status {
                    item.status = status;
                }
                if update.due_date.is_some() {
                    item.due_date = update.due_date;
                }
                if let Some(template) = update.template_type.as_deref().filter(|t| !t.trim().is_empty()) {
                    item.template_type = TemplateType::normalize(Some(template));
                }
                items::update(tx, &mut item)?;

                let html = update.html.as_deref().unwrap_or("");
                blocks::replace(tx, item_id, &[BlockPayload::html(0, html)])?;

                if let Some(date) = item.due_date {
                    day_notes::upsert(
                        tx,
                        user_id,
                        &DayNote {
                            due_date: date,
                            issue: update.issue.clone().unwrap_or_default(),
                            memo: update.memo.clone().unwrap_or_default(),
                        },
                    )?;
                }
                Ok(())
            })
            .await?;
        self.item_detail(user_id, item_id).await
    }

    /// Create the configured admin, or promote and reset an existing account.
    pub async fn bootstrap(&self, config: &AdminConfig) -> Result<()> {
        if !config.seed_enabled {
            return Ok(());
        }
        let email = config.seed_email.trim().to_lowercase();
        let password = config.seed_password.clone();
        let passwords = self.passwords.clone();
        let hash = tokio::task::spawn_blocking(move || passwords.hash(&password)).await??;
        let nickname = config.seed_nickname.clone();

        let created = self
            .store
            .write(|tx| match users::find_by_email(tx, &email)? {
                Some(existing) => {
                    users::update_role(tx, existing.id, Role::Admin)?;
                    users::update_password(tx, existing.id, &hash)?;
                    users::set_login_state(tx, existing.id, 0, None)?;
                    Ok(false)
                }
                None => {
                    let now = store::now();
                    users::insert(
                        tx,
                        &User {
                            id: Uuid::new_v4(),
                            email: email.clone(),
                            nickname: nickname.clone(),
                            password_hash: hash.clone(),
                            role: Role::Admin,
                            failed_login_count: 0,
                            locked_until: None,
                            created_at: now,
                            updated_at: now,
                        },
                    )?;
                    Ok(true)
                }
            })
            .await?;
        info!(email = %email, created, "Admin account ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::store::test_support;
    use daybook_storage::MemoryStorage;

    fn service(store: Arc<Store>) -> AdminService {
        let passwords = Passwords::new(&AuthConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            ..AuthConfig::default()
        })
        .unwrap();
        AdminService::new(store, Arc::new(MemoryStorage::new()), passwords)
    }

    async fn seeded() -> (AdminService, Arc<Store>, User, WorkspaceItem) {
        let store = Arc::new(Store::in_memory().unwrap());
        let (user, item) = store
            .write(|tx| {
                let user = test_support::user(tx, "target@example.com");
                let mut item = WorkspaceItem::new(user.id, "Audit me");
                item.due_date = NaiveDate::from_ymd_opt(2024, 7, 1);
                items::insert(tx, &item)?;
                blocks::insert(tx, item.id, &BlockPayload::html(0, "<p>body</p>"))?;
                Ok((user, item))
            })
            .await
            .unwrap();
        (service(store.clone()), store, user, item)
    }

    #[tokio::test]
    async fn test_stats_and_listing() {
        let (admin, _, user, item) = seeded().await;
        let stats = admin.stats().await.unwrap();
        assert_eq!(stats, Stats { total_users: 1, total_items: 1, total_blocks: 1, total_files: 0 });

        let users = admin.users().await.unwrap();
        assert_eq!(users[0].item_count, 1);

        let rows = admin.user_items(user.id).await.unwrap();
        assert_eq!(rows[0].id, item.id);
        assert_eq!(rows[0].block_count, 1);

        assert!(matches!(admin.user_items(Uuid::new_v4()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_item_must_match_user() {
        let (admin, store, _, item) = seeded().await;
        let stranger = store
            .write(|tx| Ok(test_support::user(tx, "stranger@example.com")))
            .await
            .unwrap();
        assert!(matches!(
            admin.item_blocks(stranger.id, item.id).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_detail_roundtrip() {
        let (admin, _, user, item) = seeded().await;
        let detail = admin.item_detail(user.id, item.id).await.unwrap();
        assert_eq!(detail.html, "<p>body</p>");
        assert_eq!(detail.issue, "");

        let updated = admin
            .update_item_detail(
                user.id,
                item.id,
                ItemDetailUpdate {
                    title: Some("Reviewed".into()),
                    html: Some("<p>fixed</p>".into()),
                    issue: Some("late".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Reviewed");
        assert_eq!(updated.html, "<p>fixed</p>");
        assert_eq!(updated.issue, "late");
        assert_eq!(updated.memo, "");
    }

    #[tokio::test]
    async fn test_role_unlock_delete() {
        let (admin, store, user, _) = seeded().await;
        let promoted = admin
            .update_role(user.id, RoleUpdate { role: Some("admin".into()) })
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(matches!(
            admin.update_role(user.id, RoleUpdate { role: Some("ROOT".into()) }).await,
            Err(Error::Validation(_))
        ));

        store
            .write(|tx| users::set_login_state(tx, user.id, 3, Some(Utc::now())))
            .await
            .unwrap();
        admin.unlock(user.id).await.unwrap();
        let reloaded = store.read(|c| users::find_by_id(c, user.id)).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_login_count, 0);
        assert!(reloaded.locked_until.is_none());

        admin.delete_user(user.id).await.unwrap();
        assert_eq!(store.read(items::count).await.unwrap(), 0);
        assert!(matches!(admin.delete_user(user.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_creates_then_promotes() {
        let store = Arc::new(Store::in_memory().unwrap());
        let admin = service(store.clone());
        let config = AdminConfig {
            seed_email: "Boss@Example.com".into(),
            ..AdminConfig::default()
        };
        admin.bootstrap(&config).await.unwrap();
        let boss = store
            .read(|c| users::find_by_email(c, "boss@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(boss.role, Role::Admin);

        store
            .write(|tx| {
                users::update_role(tx, boss.id, Role::User)?;
                users::set_login_state(tx, boss.id, 4, Some(Utc::now()))
            })
            .await
            .unwrap();
        admin.bootstrap(&config).await.unwrap();
        let again = store.read(|c| users::find_by_id(c, boss.id)).await.unwrap().unwrap();
        assert_eq!(again.role, Role::Admin);
        assert_eq!(again.failed_login_count, 0);
        assert_eq!(store.read(users::count).await.unwrap(), 1);
    }
}
