//! `/api/admin/*` handlers. Role checks happen in the auth middleware.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use crate::admin::{AdminItem, AdminItemBlocks, AdminUser, ItemDetail, ItemDetailUpdate, RoleUpdate, Stats};

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.app.admin.stats().await?))
}

pub async fn users(State(state): State<AppState>) -> Result<Json<Vec<AdminUser>>, ApiError> {
    Ok(Json(state.app.admin.users().await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.app.admin.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<AdminUser>, ApiError> {
    Ok(Json(state.app.admin.update_role(user_id, update).await?))
}

pub async fn unlock(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.app.admin.unlock(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn user_items(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<AdminItem>>, ApiError> {
    Ok(Json(state.app.admin.user_items(user_id).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.app.admin.delete_item(user_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn item_blocks(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AdminItemBlocks>, ApiError> {
    Ok(Json(state.app.admin.item_blocks(user_id, item_id).await?))
}

pub async fn item_detail(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ItemDetail>, ApiError> {
    Ok(Json(state.app.admin.item_detail(user_id, item_id).await?))
}

pub async fn update_item_detail(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<ItemDetailUpdate>,
) -> Result<Json<ItemDetail>, ApiError> {
    Ok(Json(state.app.admin.update_item_detail(user_id, item_id, update).await?))
}
