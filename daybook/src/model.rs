//! Domain types shared by the store, the services and the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use daybook_storage::StoredName;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Todo => "todo",
            ItemStatus::Doing => "doing",
            ItemStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(ItemStatus::Todo),
            "doing" => Some(ItemStatus::Doing),
            "done" => Some(ItemStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    #[default]
    Free,
    Worklog,
    Meeting,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::Free => "free",
            TemplateType::Worklog => "worklog",
            TemplateType::Meeting => "meeting",
        }
    }

    /// Unknown or missing values fall back to `free`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("worklog") => TemplateType::Worklog,
            Some("meeting") => TemplateType::Meeting,
            _ => TemplateType::Free,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
    pub role: Role,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            nickname: self.nickname.clone(),
            role: self.role,
        }
    }
}

/// Public view of an account, as returned by `/api/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub role: Role,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceItem {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub status: ItemStatus,
    pub due_date: Option<NaiveDate>,
    pub template_type: TemplateType,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceItem {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = crate::store::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            parent_id: None,
            title: title.into(),
            status: ItemStatus::Todo,
            due_date: None,
            template_type: TemplateType::Free,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: Uuid,
    #[serde(skip)]
    pub item_id: Uuid,
    pub sort_order: i32,
    #[serde(rename = "type")]
    pub block_type: String,
    pub content: String,
}

/// Block as sent by clients; ids are assigned server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(rename = "type", default)]
    pub block_type: String,
    #[serde(default)]
    pub content: String,
}

impl BlockPayload {
    pub fn html(sort_order: i32, html: &str) -> Self {
        Self {
            id: None,
            sort_order,
            block_type: "paragraph".to_string(),
            content: serde_json::json!({ "html": html }).to_string(),
        }
    }
}

impl From<&Block> for BlockPayload {
    fn from(block: &Block) -> Self {
        Self {
            id: Some(block.id),
            sort_order: block.sort_order,
            block_type: block.block_type.clone(),
            content: block.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayNote {
    pub due_date: NaiveDate,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub memo: String,
}

impl DayNote {
    pub fn empty(due_date: NaiveDate) -> Self {
        Self {
            due_date,
            issue: String::new(),
            memo: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAsset {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub original_name: String,
    pub stored_name: StoredName,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl FileAsset {
    /// Relative URL under which the blob is served.
    pub fn url(&self) -> String {
        file_url(&self.stored_name)
    }
}

pub fn file_url(stored_name: &StoredName) -> String {
    format!("/files/{}", stored_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}
