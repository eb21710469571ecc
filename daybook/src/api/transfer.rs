//! Backup export/import and migration upload handlers.

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;

use super::error::ApiError;
use super::server::AppState;
use crate::auth::Principal;
use crate::backup::{BackupImportReport, ImportMode};
use crate::migration::MigrationReport;

const BACKUP_FILE_NAME: &str = "backup.zip";

/// A multipart form with one file part and any number of text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Option<Bytes>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
                form.data = Some(data);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid field '{}': {}", name, e)))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// The file part, rejecting forms without one.
    pub fn require_file(&mut self) -> Result<Bytes, ApiError> {
        self.data
            .take()
            .ok_or_else(|| ApiError::bad_request("multipart field 'file' is required"))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    #[serde(default)]
    pub mode: Option<String>,
}

fn parse_mode(raw: Option<&str>) -> Result<ImportMode, ApiError> {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("merge") => Ok(ImportMode::Merge),
        Some("replace") => Ok(ImportMode::Replace),
        Some(other) => Err(ApiError::bad_request(format!(
            "invalid import mode '{}', expected merge or replace",
            other
        ))),
    }
}

pub async fn export_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, ApiError> {
    let archive = state.app.backup.export(principal.user_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", BACKUP_FILE_NAME),
            ),
        ],
        archive,
    )
        .into_response())
}

/// `mode` may come from the query string or a form field; the query wins.
pub async fn import_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ImportParams>,
    multipart: Multipart,
) -> Result<Json<BackupImportReport>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let mode = parse_mode(params.mode.as_deref().or_else(|| form.field("mode")))?;
    let data = form.require_file()?;
    let report = state.app.backup.import(principal.user_id, data, mode).await?;
    Ok(Json(report))
}

pub async fn import_migration(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<Json<MigrationReport>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let data = form.require_file()?;
    let report = state
        .app
        .migration
        .import(principal.user_id, form.file_name.as_deref(), data)
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(None).unwrap(), ImportMode::Merge);
        assert_eq!(parse_mode(Some(" Replace ")).unwrap(), ImportMode::Replace);
        assert!(parse_mode(Some("wipe")).is_err());
    }
}
