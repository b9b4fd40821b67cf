use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::ApiResponse;

use crate::models::{Favorite, NewFavorite, Property};
use crate::schema::{favorites, properties, users};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub favorite_id: Uuid,
    pub favorited_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub property: Property,
}

/// GET /api/favorites - the caller's favorites, newest first.
pub async fn list_favorites(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<FavoriteEntry>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let rows: Vec<(Favorite, Property)> = favorites::table
        .inner_join(properties::table)
        .filter(favorites::user_id.eq(auth_user.id))
        .order(favorites::created_at.desc())
        .load(&mut conn)?;

    let entries = rows
        .into_iter()
        .map(|(favorite, property)| FavoriteEntry {
            favorite_id: favorite.id,
            favorited_at: favorite.created_at,
            property,
        })
        .collect();

    Ok(Json(ApiResponse::ok(entries)))
}

/// The owner hears about a favorite only the first time, and never about
/// their own.
fn should_notify_owner(owner_id: Uuid, actor_id: Uuid, already_favorited: bool) -> bool {
    !already_favorited && owner_id != actor_id
}

/// POST /api/favorites/:property_id - idempotent; re-favoriting returns the
/// existing row and triggers no second notification.
pub async fn add_favorite(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Favorite>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let property: Property = properties::table
        .find(property_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;

    let existing: Option<Favorite> = favorites::table
        .filter(favorites::user_id.eq(auth_user.id))
        .filter(favorites::property_id.eq(property_id))
        .first(&mut conn)
        .optional()?;
    let notify_owner = should_notify_owner(property.owner_id, auth_user.id, existing.is_some());
    if let Some(favorite) = existing {
        return Ok(Json(ApiResponse::ok(favorite)));
    }

    let favorite: Favorite = diesel::insert_into(favorites::table)
        .values(NewFavorite {
            user_id: auth_user.id,
            property_id,
        })
        .get_result(&mut conn)?;

    if notify_owner {
        let buyer_name: String = users::table
            .find(auth_user.id)
            .select(users::name)
            .first(&mut conn)
            .unwrap_or_else(|_| "Someone".to_string());

        if let Err(e) = state.notifier.notify(
            property.owner_id,
            "new_favorite",
            "New interest in your property",
            &format!("{buyer_name} added \"{}\" to their favorites", property.title),
            Some(serde_json::json!({
                "propertyId": property.id,
                "userId": auth_user.id,
            })),
        ) {
            tracing::warn!(property_id = %property.id, error = %e, "favorite notification failed");
        }
    }

    tracing::debug!(user_id = %auth_user.id, property_id = %property_id, "favorite added");

    Ok(Json(ApiResponse::ok(favorite)))
}

/// DELETE /api/favorites/:property_id
pub async fn remove_favorite(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        favorites::table
            .filter(favorites::user_id.eq(auth_user.id))
            .filter(favorites::property_id.eq(property_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::new(ErrorCode::FavoriteNotFound, "favorite not found"));
    }

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "deleted": true }),
        "favorite removed",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_favorite_by_another_user_notifies_the_owner() {
        let owner = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        assert!(should_notify_owner(owner, buyer, false));
    }

    #[test]
    fn refavoriting_stays_silent() {
        let owner = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        assert!(!should_notify_owner(owner, buyer, true));
    }

    #[test]
    fn favoriting_your_own_listing_stays_silent() {
        let owner = Uuid::new_v4();
        assert!(!should_notify_owner(owner, owner, false));
        assert!(!should_notify_owner(owner, owner, true));
    }
}
