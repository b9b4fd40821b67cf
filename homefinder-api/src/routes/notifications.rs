use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::pagination::{Paginated, PaginationParams};
use homefinder_shared::types::ApiResponse;

use crate::models::Notification;
use crate::schema::notifications;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// GET /api/notifications - newest first.
pub async fn list_notifications(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total: i64 = notifications::table
        .filter(notifications::user_id.eq(auth_user.id))
        .select(count_star())
        .first(&mut conn)?;

    let items: Vec<Notification> = notifications::table
        .filter(notifications::user_id.eq(auth_user.id))
        .order(notifications::created_at.desc())
        .offset(params.offset())
        .limit(params.limit())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let unread_count: i64 = notifications::table
        .filter(notifications::user_id.eq(auth_user.id))
        .filter(notifications::is_read.eq(false))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { unread_count })))
}

/// PUT /api/notifications/:id/read - idempotent; read_at is set on the
/// first transition only.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let existing: Notification = notifications::table
        .find(notification_id)
        .filter(notifications::user_id.eq(auth_user.id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))?;

    if existing.is_read {
        return Ok(Json(ApiResponse::ok(existing)));
    }

    let updated: Notification = diesel::update(notifications::table.find(notification_id))
        .set((
            notifications::is_read.eq(true),
            notifications::read_at.eq(Some(Utc::now())),
        ))
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(updated)))
}

/// PUT /api/notifications/read-all
pub async fn mark_all_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(auth_user.id))
            .filter(notifications::is_read.eq(false)),
    )
    .set((
        notifications::is_read.eq(true),
        notifications::read_at.eq(Some(Utc::now())),
    ))
    .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({ "marked": updated }))))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        notifications::table
            .find(notification_id)
            .filter(notifications::user_id.eq(auth_user.id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::new(ErrorCode::NotificationNotFound, "notification not found"));
    }

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "deleted": true }),
        "notification deleted",
    )))
}
