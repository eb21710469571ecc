//! HTTP client for the Daybook REST API.

use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use daybook::admin::{AdminUser, Stats};
use daybook::api::cookies::{CSRF_COOKIE, CSRF_HEADER};
use daybook::api::ErrorBody;
use daybook::auth::{LoginRequest, RegisterRequest, TokenResponse};
use daybook::backup::{BackupImportReport, ImportMode};
use daybook::content::ItemBlocks;
use daybook::files::UploadedFile;
use daybook::migration::MigrationReport;
use daybook::model::{BlockPayload, DayNote, Tag, UserProfile, WorkspaceItem};
use daybook::workspace::{BoardRow, CreateItem, DayNoteUpdate, UpdateItem};

use crate::document::ItemDocument;
use crate::error::{ClientError, Result};
use crate::links::FileLinks;
use crate::session::Session;

pub struct ApiClient {
    http: Client,
    jar: Arc<Jar>,
    base: Url,
    base_str: String,
    links: FileLinks,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_str = base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_str).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!("{}: expected http or https", base_url)));
        }
        let jar = Arc::new(Jar::default());
        let http = Client::builder().cookie_provider(jar.clone()).build()?;
        Ok(Self {
            http,
            jar,
            links: FileLinks::new(&base_str),
            base,
            base_str,
            session: Session::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_str
    }

    pub fn links(&self) -> &FileLinks {
        &self.links
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_str, path)
    }

    fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base)?;
        let cookies = header.to_str().ok()?.to_string();
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_string())
    }

    /// Turn a non-2xx response into [`ClientError::Api`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await?;
        let (code, message) = match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => (err.code, err.message),
            Err(_) => (
                format!("HTTP_{}", status.as_u16()),
                String::from_utf8_lossy(&body).into_owned(),
            ),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send an authorized request. On 401 the request waits for (or performs)
    /// a single refresh and is replayed once with the new token.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let (token, generation) = self.session.snapshot();
        let mut request = build(&self.http);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        debug!(generation, "Request unauthorized, waiting for token refresh");
        let token = self.recover(generation).await?;
        let response = build(&self.http).bearer_auth(token).send().await?;
        Self::check(response).await
    }

    /// Get a token newer than `seen`, refreshing only if no one else already has.
    async fn recover(&self, seen: u64) -> Result<String> {
        let _gate = self.session.refresh_gate().await;
        let (token, generation) = self.session.snapshot();
        if generation != seen {
            return token.ok_or(ClientError::SessionExpired);
        }
        match self.refresh().await {
            Ok(token) => Ok(token),
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.session.clear();
                Err(ClientError::SessionExpired)
            }
        }
    }

    /// Rotate the session using the refresh cookie.
    pub async fn refresh(&self) -> Result<String> {
        let mut request = self.http.post(self.url("/api/auth/refresh"));
        if let Some(csrf) = self.csrf_token() {
            request = request.header(CSRF_HEADER, csrf);
        }
        let response = Self::check(request.send().await?).await?;
        let tokens: TokenResponse = Self::json(response).await?;
        self.session.set_token(tokens.access_token.clone());
        debug!(generation = self.session.generation(), "Access token refreshed");
        Ok(tokens.access_token)
    }

    // ---- auth ----

    pub async fn register(&self, email: &str, nickname: Option<&str>, password: &str) -> Result<UserProfile> {
        let request = RegisterRequest {
            email: email.to_string(),
            nickname: nickname.map(str::to_string),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&request)
            .send()
            .await?;
        Self::json(Self::check(response).await?).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&request)
            .send()
            .await?;
        let tokens: TokenResponse = Self::json(Self::check(response).await?).await?;
        self.session.set_token(tokens.access_token.clone());
        Ok(tokens)
    }

    /// Revoke the refresh token server-side and forget the access token.
    pub async fn logout(&self) -> Result<()> {
        let result = self.send(|http| http.post(self.url("/api/auth/logout"))).await;
        self.session.clear();
        result.map(|_| ())
    }

    pub async fn me(&self) -> Result<UserProfile> {
        let response = self.send(|http| http.get(self.url("/api/auth/me"))).await?;
        Self::json(response).await
    }

    // ---- workspace ----

    pub async fn items(&self, q: Option<&str>, due_date: Option<NaiveDate>) -> Result<Vec<WorkspaceItem>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(q) = q {
            params.push(("q", q.to_string()));
        }
        if let Some(date) = due_date {
            params.push(("dueDate", date.to_string()));
        }
        let response = self
            .send(|http| http.get(self.url("/api/workspace/items")).query(&params))
            .await?;
        Self::json(response).await
    }

    pub async fn create_item(&self, request: &CreateItem) -> Result<WorkspaceItem> {
        let response = self
            .send(|http| http.post(self.url("/api/workspace/items")).json(request))
            .await?;
        Self::json(response).await
    }

    pub async fn update_item(&self, id: Uuid, request: &UpdateItem) -> Result<WorkspaceItem> {
        let response = self
            .send(|http| http.patch(self.url(&format!("/api/workspace/items/{}", id))).json(request))
            .await?;
        Self::json(response).await
    }

    pub async fn delete_item(&self, id: Uuid) -> Result<()> {
        self.send(|http| http.delete(self.url(&format!("/api/workspace/items/{}", id))))
            .await?;
        Ok(())
    }

    pub async fn recent_items(&self) -> Result<Vec<WorkspaceItem>> {
        let response = self
            .send(|http| http.get(self.url("/api/workspace/items/recent")))
            .await?;
        Self::json(response).await
    }

    /// Board rows for a `YYYY-MM` month.
    pub async fn board(&self, month: &str) -> Result<Vec<BoardRow>> {
        let response = self
            .send(|http| http.get(self.url("/api/workspace/items/board")).query(&[("month", month)]))
            .await?;
        Self::json(response).await
    }

    pub async fn day_note(&self, date: NaiveDate) -> Result<DayNote> {
        let date = date.to_string();
        let response = self
            .send(|http| http.get(self.url("/api/workspace/items/day-note")).query(&[("date", &date)]))
            .await?;
        Self::json(response).await
    }

    pub async fn save_day_note(&self, date: NaiveDate, update: &DayNoteUpdate) -> Result<DayNote> {
        let date = date.to_string();
        let response = self
            .send(|http| {
                http.put(self.url("/api/workspace/items/day-note"))
                    .query(&[("date", &date)])
                    .json(update)
            })
            .await?;
        Self::json(response).await
    }

    // ---- content ----

    pub async fn blocks(&self, item_id: Uuid) -> Result<ItemBlocks> {
        let response = self
            .send(|http| http.get(self.url(&format!("/api/content/{}/blocks", item_id))))
            .await?;
        Self::json(response).await
    }

    pub async fn save_blocks(&self, item_id: Uuid, blocks: &[BlockPayload]) -> Result<ItemBlocks> {
        let body = json!({ "blocks": blocks });
        let response = self
            .send(|http| http.put(self.url(&format!("/api/content/{}/blocks", item_id))).json(&body))
            .await?;
        Self::json(response).await
    }

    pub async fn load_document(&self, item_id: Uuid) -> Result<ItemDocument> {
        let blocks = self.blocks(item_id).await?;
        Ok(ItemDocument::from_blocks(&blocks.blocks, &self.links))
    }

    pub async fn save_document(&self, item_id: Uuid, document: &ItemDocument) -> Result<ItemBlocks> {
        self.save_blocks(item_id, &document.to_blocks(&self.links)).await
    }

    // ---- files and tags ----

    /// Upload an image for `item_id`. The server infers the type from `file_name`.
    pub async fn upload_file(&self, item_id: Uuid, file_name: &str, data: Bytes) -> Result<UploadedFile> {
        let response = self
            .send(|http| {
                let form = Form::new()
                    .text("itemId", item_id.to_string())
                    .part("file", Part::stream(data.clone()).file_name(file_name.to_string()));
                http.post(self.url("/api/files/upload")).multipart(form)
            })
            .await?;
        Self::json(response).await
    }

    pub async fn files(&self, item_id: Uuid) -> Result<Vec<UploadedFile>> {
        let response = self
            .send(|http| http.get(self.url(&format!("/api/files/item/{}", item_id))))
            .await?;
        Self::json(response).await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>> {
        let response = self.send(|http| http.get(self.url("/api/tags"))).await?;
        Self::json(response).await
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let body = json!({ "name": name });
        let response = self
            .send(|http| http.post(self.url("/api/tags")).json(&body))
            .await?;
        Self::json(response).await
    }

    // ---- backup and migration ----

    /// The archive is opaque to the client.
    pub async fn export_backup(&self) -> Result<Bytes> {
        let response = self
            .send(|http| http.get(self.url("/api/backup/export")))
            .await?;
        Ok(response.bytes().await?)
    }

    /// Restore an exported archive. Cached workspace views are stale after this.
    pub async fn import_backup(&self, file_name: &str, data: Bytes, mode: ImportMode) -> Result<BackupImportReport> {
        let response = self
            .send(|http| {
                let form = Form::new().part("file", Part::stream(data.clone()).file_name(file_name.to_string()));
                http.post(self.url("/api/backup/import"))
                    .query(&[("mode", mode)])
                    .multipart(form)
            })
            .await?;
        Self::json(response).await
    }

    /// Upload a third-party export; `file_name` becomes the archive's source name.
    pub async fn import_migration(&self, file_name: &str, data: Bytes) -> Result<MigrationReport> {
        let response = self
            .send(|http| {
                let form = Form::new().part("file", Part::stream(data.clone()).file_name(file_name.to_string()));
                http.post(self.url("/api/migration/import")).multipart(form)
            })
            .await?;
        Self::json(response).await
    }

    // ---- admin ----

    pub async fn admin_stats(&self) -> Result<Stats> {
        let response = self.send(|http| http.get(self.url("/api/admin/stats"))).await?;
        Self::json(response).await
    }

    pub async fn admin_users(&self) -> Result<Vec<AdminUser>> {
        let response = self.send(|http| http.get(self.url("/api/admin/users"))).await?;
        Self::json(response).await
    }
}
