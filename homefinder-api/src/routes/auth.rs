use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::{AuthUser, UserRole};
use homefinder_shared::types::ApiResponse;

use crate::models::{NewUser, PublicUser, User};
use crate::schema::users;
use crate::services::security;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    pub phone: Option<String>,
    /// Absent means visitor; legacy localized spellings are accepted.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<String>,
}

/// Normalize an optional role string, falling back to visitor.
fn resolve_role(role: Option<&str>) -> AppResult<UserRole> {
    match role {
        Some(raw) => UserRole::from_str(raw).map_err(|e| AppError::new(ErrorCode::InvalidRole, e)),
        None => Ok(UserRole::Visitor),
    }
}

fn device_name(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(255).collect())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    security::validate_password(&req.password)?;

    let role = resolve_role(req.role.as_deref())?;

    let email = req.email.to_lowercase();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let exists: bool = users::table
        .filter(users::email.eq(&email))
        .count()
        .get_result::<i64>(&mut conn)
        .map(|c| c > 0)
        .unwrap_or(false);
    if exists {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
    }

    let password_hash = security::hash_password(&req.password)?;
    let user: User = diesel::insert_into(users::table)
        .values(NewUser {
            email,
            password_hash,
            name: req.name.trim().to_string(),
            phone: req.phone,
            role: role.to_string(),
        })
        .get_result(&mut conn)?;

    let token = state
        .tokens
        .issue(user.id, role, device_name(&headers), client_ip(&headers))?;

    tracing::info!(user_id = %user.id, role = %role, "user registered");

    Ok(Json(ApiResponse::ok(AuthResponse {
        user: PublicUser::from(user),
        token,
    })))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let user: Option<User> = users::table
        .filter(users::email.eq(req.email.to_lowercase()))
        .first(&mut conn)
        .optional()?;

    // Same error for unknown email and bad password
    let user = user.ok_or_else(|| {
        AppError::new(ErrorCode::InvalidCredentials, "invalid email or password")
    })?;
    if !security::verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, "invalid email or password"));
    }

    let role = UserRole::from_str(&user.role)
        .map_err(|e| AppError::internal(format!("corrupt role in storage: {e}")))?;
    let token = state
        .tokens
        .issue(user.id, role, device_name(&headers), client_ip(&headers))?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(ApiResponse::ok(AuthResponse {
        user: PublicUser::from(user),
        token,
    })))
}

/// GET /api/auth/me
pub async fn me(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user: User = users::table
        .find(auth_user.id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    state.tokens.touch(auth_user.token_id);

    Ok(Json(ApiResponse::ok(PublicUser::from(user))))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(AppError::new(ErrorCode::ValidationError, "name must not be empty"));
        }
    }

    // Role changes are normalized through the same parser as registration
    let new_role = match req.role.as_deref() {
        Some(raw) => Some(
            UserRole::from_str(raw).map_err(|e| AppError::new(ErrorCode::InvalidRole, e))?,
        ),
        None => None,
    };

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let current: User = users::table
        .find(auth_user.id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let updated: User = diesel::update(users::table.find(auth_user.id))
        .set((
            users::name.eq(req.name.map(|n| n.trim().to_string()).unwrap_or(current.name)),
            users::phone.eq(req.phone.or(current.phone)),
            users::avatar.eq(req.avatar.or(current.avatar)),
            users::role.eq(new_role.map(|r| r.to_string()).unwrap_or(current.role)),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(PublicUser::from(updated))))
}

/// DELETE /api/auth/account - removes the user and, via cascading foreign
/// keys, everything hanging off them.
pub async fn delete_account(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(users::table.find(auth_user.id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    tracing::info!(user_id = %auth_user.id, "account deleted");

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "deleted": true }),
        "account deleted",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_role_defaults_to_visitor() {
        assert_eq!(resolve_role(None).unwrap(), UserRole::Visitor);
    }

    #[test]
    fn legacy_role_spellings_are_normalized() {
        assert_eq!(resolve_role(Some("acheteur")).unwrap(), UserRole::Buyer);
        assert_eq!(resolve_role(Some("vendeur")).unwrap(), UserRole::Seller);
        assert_eq!(resolve_role(Some("buyer")).unwrap(), UserRole::Buyer);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = resolve_role(Some("admin")).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::InvalidRole, .. }));
    }

    #[test]
    fn profile_update_accepts_an_optional_role() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"name":"Sami","role":"seller"}"#).unwrap();
        assert_eq!(req.role.as_deref(), Some("seller"));

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"phone":"123"}"#).unwrap();
        assert!(req.role.is_none());
    }
}
