//! Workspace, content, file and tag handlers.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use super::transfer::UploadForm;
use crate::auth::Principal;
use crate::content::{ItemBlocks, ReplaceBlocks};
use crate::files::UploadedFile;
use crate::model::{DayNote, Tag, WorkspaceItem};
use crate::workspace::{BoardRow, CreateItem, DayNoteUpdate, ItemQuery, UpdateItem};

#[derive(Debug, Deserialize)]
pub struct BoardParams {
    pub month: String,
}

#[derive(Debug, Deserialize)]
pub struct DayNoteParams {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CreateTag {
    pub name: String,
}

pub async fn list_items(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<WorkspaceItem>>, ApiError> {
    Ok(Json(state.app.workspace.list(principal.user_id, query).await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateItem>,
) -> Result<Json<WorkspaceItem>, ApiError> {
    Ok(Json(state.app.workspace.create(principal.user_id, request).await?))
}

pub async fn recent_items(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<WorkspaceItem>>, ApiError> {
    Ok(Json(state.app.workspace.recent(principal.user_id).await?))
}

pub async fn board(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<BoardParams>,
) -> Result<Json<Vec<BoardRow>>, ApiError> {
    Ok(Json(state.app.workspace.board(principal.user_id, &params.month).await?))
}

pub async fn get_day_note(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<DayNoteParams>,
) -> Result<Json<DayNote>, ApiError> {
    Ok(Json(state.app.workspace.day_note(principal.user_id, params.date).await?))
}

pub async fn save_day_note(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<DayNoteParams>,
    Json(update): Json<DayNoteUpdate>,
) -> Result<Json<DayNote>, ApiError> {
    let note = state
        .app
        .workspace
        .save_day_note(principal.user_id, params.date, update)
        .await?;
    Ok(Json(note))
}

pub async fn get_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceItem>, ApiError> {
    Ok(Json(state.app.workspace.get(principal.user_id, id).await?))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateItem>,
) -> Result<Json<WorkspaceItem>, ApiError> {
    Ok(Json(state.app.workspace.update(principal.user_id, id, request).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.app.workspace.delete(principal.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_blocks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ItemBlocks>, ApiError> {
    Ok(Json(state.app.content.get(principal.user_id, item_id).await?))
}

pub async fn replace_blocks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ReplaceBlocks>,
) -> Result<Json<ItemBlocks>, ApiError> {
    let blocks = state
        .app
        .content
        .replace(principal.user_id, item_id, request)
        .await?;
    Ok(Json(blocks))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<Json<UploadedFile>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let item_id = form
        .field("itemId")
        .ok_or_else(|| ApiError::bad_request("multipart field 'itemId' is required"))?;
    let item_id = Uuid::parse_str(item_id)
        .map_err(|_| ApiError::bad_request(format!("invalid itemId '{}'", item_id)))?;
    let data = form.require_file()?;
    let original_name = form.file_name.clone().unwrap_or_default();

    let uploaded = state
        .app
        .files
        .upload(
            principal.user_id,
            item_id,
            &original_name,
            form.content_type.as_deref(),
            data,
        )
        .await?;
    Ok(Json(uploaded))
}

pub async fn list_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Vec<UploadedFile>>, ApiError> {
    let assets = state.app.files.list_by_item(principal.user_id, item_id).await?;
    Ok(Json(assets.iter().map(UploadedFile::from).collect()))
}

/// Public so `<img src="/files/...">` works without a token.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(stored_name): Path<String>,
) -> Result<Response, ApiError> {
    let served = state.app.files.serve(&stored_name).await?;
    Ok(([(header::CONTENT_TYPE, served.mime_type)], served.data).into_response())
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.app.workspace.tags(principal.user_id).await?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateTag>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.app.workspace.create_tag(principal.user_id, &request.name).await?))
}
