//! Workspace items, day notes, tags and the monthly board.

pub mod board;

use chrono::{Months, NaiveDate};
use daybook_storage::BlobStorage;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{DayNote, ItemStatus, Tag, TemplateType, WorkspaceItem};
use crate::store::{blocks, day_notes, files, items, tags, Store};
use crate::{Error, Result};

pub use board::{BoardRow, Summary};

const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItem {
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub template_type: Option<String>,
}

/// Partial update. For `parentId` and `dueDate` an explicit `null` clears
/// the field while an absent key leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub template_type: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub tag_ids: Option<Vec<Uuid>>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayNoteUpdate {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// First and last day of a `YYYY-MM` month.
pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| Error::BadRequest(format!("invalid month '{}', expected YYYY-MM", month)))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::BadRequest(format!("month out of range: {}", month)))?;
    Ok((first, last))
}

pub struct WorkspaceService {
    store: Arc<Store>,
    storage: Arc<dyn BlobStorage>,
}

impl WorkspaceService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn BlobStorage>) -> Self {
        Self { store, storage }
    }

    pub async fn create(&self, user_id: Uuid, request: CreateItem) -> Result<WorkspaceItem> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("title must not be blank".to_string()));
        }
        let mut item = WorkspaceItem::new(user_id, title);
        item.parent_id = request.parent_id;
        item.due_date = request.due_date;
        item.template_type = TemplateType::normalize(request.template_type.as_deref());

        self.store
            .write(|tx| {
                if let Some(parent) = item.parent_id {
                    items::find_owned(tx, user_id, parent)?;
                }
                items::insert(tx, &item)
            })
            .await?;
        debug!(item = %item.id, "Created workspace item");
        Ok(item)
    }

    pub async fn list(&self, user_id: Uuid, query: ItemQuery) -> Result<Vec<WorkspaceItem>> {
        let keyword = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        self.store
            .read(move |c| match (keyword, query.due_date) {
                (Some(q), date) => items::search(c, user_id, &q, date),
                (None, Some(date)) => items::list_by_date(c, user_id, date),
                (None, None) => items::list_by_user(c, user_id),
            })
            .await
    }

    pub async fn recent(&self, user_id: Uuid) -> Result<Vec<WorkspaceItem>> {
        self.store
            .read(|c| items::recent(c, user_id, RECENT_LIMIT))
            .await
    }

    pub async fn get(&self, user_id: Uuid, item_id: Uuid) -> Result<WorkspaceItem> {
        self.store
            .read(|c| items::find_owned(c, user_id, item_id))
            .await
    }

    pub async fn update(&self, user_id: Uuid, item_id: Uuid, request: UpdateItem) -> Result<WorkspaceItem> {
        let status = match request.status.as_deref() {
            Some(raw) => Some(
                ItemStatus::parse(raw)
                    .ok_or_else(|| Error::Validation(format!("invalid status '{}'", raw)))?,
            ),
            None => None,
        };

        self.store
            .write(|tx| {
                let mut item = items::find_owned(tx, user_id, item_id)?;
                if let Some(title) = request.title.as_deref().map(str::trim) {
                    if !title.is_empty() {
                        item.title = title.to_string();
                    }
                }
                if let Some(status) = status {
                    item.status = status;
                }
                if let Some(due_date) = request.due_date {
                    item.due_date = due_date;
                }
                if let Some(template) = request.template_type.as_deref() {
                    item.template_type = TemplateType::normalize(Some(template));
                }
                if let Some(parent_id) = request.parent_id {
                    if let Some(parent) = parent_id {
                        if parent == item_id {
                            return Err(Error::Validation("an item cannot be its own parent".to_string()));
                        }
                        items::find_owned(tx, user_id, parent)?;
                    }
                    item.parent_id = parent_id;
                }
                items::update(tx, &mut item)?;
                if let Some(tag_ids) = &request.tag_ids {
                    tags::set_item_tags(tx, user_id, item_id, tag_ids)?;
                    item.tag_ids = tag_ids.clone();
                }
                Ok(item)
            })
            .await
    }

    /// Delete an item with its blocks, tag links and attachments.
    pub async fn delete(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        let stored = self
            .store
            .write(|tx| {
                items::find_owned(tx, user_id, item_id)?;
                let stored = files::stored_names_for_item(tx, item_id)?;
                items::delete(tx, item_id)?;
                Ok(stored)
            })
            .await?;
        self.storage.delete_many(&stored).await;
        debug!(item = %item_id, files = stored.len(), "Deleted workspace item");
        Ok(())
    }

    pub async fn board(&self, user_id: Uuid, month: &str) -> Result<Vec<BoardRow>> {
        let (from, to) = month_bounds(month)?;
        self.store
            .read(|c| {
                let rows = items::list_between(c, user_id, from, to)?;
                let notes = day_notes::list_between(c, user_id, from, to)?;
                rows.iter()
                    .map(|item| {
                        let first = blocks::first(c, item.id)?;
                        let note = item.due_date.and_then(|d| notes.get(&d));
                        Ok(board::board_row(item, first.as_ref().map(|b| b.content.as_str()), note))
                    })
                    .collect()
            })
            .await
    }

    pub async fn day_note(&self, user_id: Uuid, date: NaiveDate) -> Result<DayNote> {
        let note = self.store.read(|c| day_notes::get(c, user_id, date)).await?;
        Ok(note.unwrap_or_else(|| DayNote::empty(date)))
    }

    /// Upsert; absent fields keep their stored value.
    pub async fn save_day_note(&self, user_id: Uuid, date: NaiveDate, update: DayNoteUpdate) -> Result<DayNote> {
        self.store
            .write(|tx| {
                let mut note = day_notes::get(tx, user_id, date)?.unwrap_or_else(|| DayNote::empty(date));
                if let Some(issue) = update.issue {
                    note.issue = issue;
                }
                if let Some(memo) = update.memo {
                    note.memo = memo;
                }
                day_notes::upsert(tx, user_id, &note)?;
                Ok(note)
            })
            .await
    }

    pub async fn create_tag(&self, user_id: Uuid, name: &str) -> Result<Tag> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("tag name must not be blank".to_string()));
        }
        self.store
            .write(|tx| {
                if tags::find_by_name(tx, user_id, &name)?.is_some() {
                    return Err(Error::Conflict(format!("tag '{}' already exists", name)));
                }
                let tag = Tag { id: Uuid::new_v4(), name: name.clone() };
                tags::insert(tx, user_id, &tag)?;
                Ok(tag)
            })
            .await
    }

    pub async fn tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        self.store.read(|c| tags::list(c, user_id)).await
    }
}
