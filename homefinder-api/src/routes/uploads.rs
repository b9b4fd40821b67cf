use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::ApiResponse;

use crate::models::Property;
use crate::schema::{properties, users};
use crate::AppState;

const ALLOWED_IMAGE_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PropertyImagesResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageRequest {
    pub image_url: String,
}

/// Filename of a locally stored upload, or None for URLs this service did
/// not produce. Rejects anything that could escape the upload directory.
fn stored_filename(url: &str) -> Option<&str> {
    let (_, filename) = url.rsplit_once("/uploads/")?;
    if filename.is_empty() || filename.contains('/') || filename.contains("..") {
        return None;
    }
    Some(filename)
}

/// Best-effort removal of a stored file; a missing file is not an error.
async fn remove_stored_file(state: &AppState, url: &str) {
    let Some(filename) = stored_filename(url) else { return };
    let path = std::path::Path::new(&state.config.upload_dir).join(filename);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(file = %path.display(), error = %e, "stored file not removed");
    }
}

fn extension_for(content_type: &str) -> AppResult<&'static str> {
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            AppError::new(
                ErrorCode::UnsupportedMediaType,
                "only jpeg, png, webp and gif images are accepted",
            )
        })
}

/// Store one image field on local disk and return its public URL.
async fn store_image(state: &AppState, mut multipart: Multipart) -> AppResult<String> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("invalid multipart body: {e}")))?
        .ok_or_else(|| AppError::new(ErrorCode::NoFileProvided, "no file provided"))?;

    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::new(ErrorCode::UnsupportedMediaType, "missing content type"))?;
    let extension = extension_for(&content_type)?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read upload: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::new(ErrorCode::NoFileProvided, "uploaded file is empty"));
    }

    let filename = format!("{}.{extension}", Uuid::new_v4());
    let dir = std::path::Path::new(&state.config.upload_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::internal(format!("upload dir unavailable: {e}")))?;
    tokio::fs::write(dir.join(&filename), &bytes)
        .await
        .map_err(|e| AppError::internal(format!("failed to store upload: {e}")))?;

    Ok(format!("{}/uploads/{filename}", state.config.public_base_url))
}

/// POST /api/uploads/avatar - replaces the caller's avatar and removes the
/// previous file once the new one is in place.
pub async fn upload_avatar(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadResponse>>> {
    let url = store_image(&state, multipart).await?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let previous: Option<Option<String>> = users::table
        .find(auth_user.id)
        .select(users::avatar)
        .first(&mut conn)
        .optional()?;

    diesel::update(users::table.find(auth_user.id))
        .set((
            users::avatar.eq(Some(url.clone())),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    if let Some(Some(old)) = previous {
        remove_stored_file(&state, &old).await;
    }

    tracing::info!(user_id = %auth_user.id, "avatar updated");

    Ok(Json(ApiResponse::ok(UploadResponse { url })))
}

/// POST /api/uploads/properties/:id/images - owner only; appends to the
/// listing's image set.
pub async fn upload_property_image(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<PropertyImagesResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let property: Property = properties::table
        .find(property_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;
    if property.owner_id != auth_user.id {
        return Err(AppError::new(ErrorCode::NotPropertyOwner, "you do not own this property"));
    }

    let url = store_image(&state, multipart).await?;

    let mut images = property.images;
    images.push(url);

    diesel::update(properties::table.find(property_id))
        .set((
            properties::images.eq(images.clone()),
            properties::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(PropertyImagesResponse { images })))
}

/// DELETE /api/uploads/properties/:id/image - owner only; removes one image
/// URL from the listing and unlinks the stored file.
pub async fn delete_property_image(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
    Json(req): Json<DeleteImageRequest>,
) -> AppResult<Json<ApiResponse<PropertyImagesResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let property: Property = properties::table
        .find(property_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;
    if property.owner_id != auth_user.id {
        return Err(AppError::new(ErrorCode::NotPropertyOwner, "you do not own this property"));
    }

    if !property.images.contains(&req.image_url) {
        return Err(AppError::not_found("image not found on this property"));
    }

    let images: Vec<String> = property
        .images
        .into_iter()
        .filter(|u| *u != req.image_url)
        .collect();

    diesel::update(properties::table.find(property_id))
        .set((
            properties::images.eq(images.clone()),
            properties::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    remove_stored_file(&state, &req.image_url).await;

    tracing::info!(property_id = %property_id, "property image removed");

    Ok(Json(ApiResponse::ok(PropertyImagesResponse { images })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_filename_extracts_local_uploads() {
        assert_eq!(
            stored_filename("http://localhost:3000/uploads/abc123.jpg"),
            Some("abc123.jpg"),
        );
    }

    #[test]
    fn stored_filename_rejects_foreign_and_escaping_urls() {
        assert_eq!(stored_filename("https://cdn.example.com/images/x.jpg"), None);
        assert_eq!(stored_filename("http://localhost:3000/uploads/"), None);
        assert_eq!(stored_filename("http://localhost:3000/uploads/../secrets"), None);
        assert_eq!(stored_filename("http://localhost:3000/uploads/a/b.jpg"), None);
    }

    #[test]
    fn unknown_content_types_are_rejected() {
        assert!(extension_for("image/png").is_ok());
        assert!(extension_for("application/pdf").is_err());
    }
}
