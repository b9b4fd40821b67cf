use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::ApiResponse;

use crate::models::{Session, User};
use crate::schema::users;
use crate::services::security;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorDisableRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorEnabledResponse {
    pub enabled: bool,
    /// Shown exactly once; only digests are stored.
    pub backup_codes: Vec<String>,
}

fn load_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    users::table
        .find(user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))
}

/// POST /api/security/change-password - changing the password revokes
/// every other session; the current token stays valid.
pub async fn change_password(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    security::validate_password(&req.new_password)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user(&mut conn, auth_user.id)?;

    if !security::verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, "current password is incorrect"));
    }

    let new_hash = security::hash_password(&req.new_password)?;
    diesel::update(users::table.find(auth_user.id))
        .set((
            users::password_hash.eq(new_hash),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    let revoked = state.tokens.revoke_other_sessions(auth_user.id, auth_user.token_id)?;

    tracing::info!(user_id = %auth_user.id, revoked_sessions = revoked, "password changed");

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "revokedSessions": revoked }),
        "password changed",
    )))
}

/// POST /api/security/2fa/generate - stores a pending secret; 2FA is not
/// active until the first code is confirmed via enable.
pub async fn generate_two_factor(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<TwoFactorSetupResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user(&mut conn, auth_user.id)?;

    let setup = security::generate_totp_setup(&user.email)?;

    diesel::update(users::table.find(auth_user.id))
        .set((
            users::two_factor_secret.eq(Some(setup.secret.clone())),
            users::two_factor_enabled.eq(false),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(TwoFactorSetupResponse {
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
    })))
}

/// POST /api/security/2fa/enable
pub async fn enable_two_factor(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TwoFactorCodeRequest>,
) -> AppResult<Json<ApiResponse<TwoFactorEnabledResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user(&mut conn, auth_user.id)?;

    let secret = user.two_factor_secret.as_deref().ok_or_else(|| {
        AppError::new(ErrorCode::TwoFactorNotConfigured, "generate a secret first")
    })?;

    if !security::verify_totp_code(secret, req.code.trim())? {
        return Err(AppError::new(ErrorCode::TwoFactorCodeInvalid, "invalid verification code"));
    }

    let (plaintext_codes, hashed_codes) = security::generate_backup_codes();

    diesel::update(users::table.find(auth_user.id))
        .set((
            users::two_factor_enabled.eq(true),
            users::two_factor_backup_codes.eq(Some(hashed_codes)),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %auth_user.id, "two-factor enabled");

    Ok(Json(ApiResponse::ok(TwoFactorEnabledResponse {
        enabled: true,
        backup_codes: plaintext_codes,
    })))
}

/// POST /api/security/2fa/disable - requires the account password, not a
/// TOTP code: the point of disabling is often a lost authenticator.
pub async fn disable_two_factor(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TwoFactorDisableRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user(&mut conn, auth_user.id)?;

    if !user.two_factor_enabled {
        return Err(AppError::new(ErrorCode::TwoFactorNotConfigured, "two-factor is not enabled"));
    }

    if !security::verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, "password is incorrect"));
    }

    diesel::update(users::table.find(auth_user.id))
        .set((
            users::two_factor_enabled.eq(false),
            users::two_factor_secret.eq(None::<String>),
            users::two_factor_backup_codes.eq(None::<serde_json::Value>),
            users::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %auth_user.id, "two-factor disabled");

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "enabled": false }),
        "two-factor disabled",
    )))
}

/// GET /api/security/sessions
pub async fn list_sessions(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<Session>>>> {
    let sessions = state.tokens.list_sessions(auth_user.id)?;
    Ok(Json(ApiResponse::ok(sessions)))
}

/// DELETE /api/security/sessions/:id
pub async fn revoke_session(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    state.tokens.revoke_session(auth_user.id, session_id)?;
    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "revoked": true }),
        "session revoked",
    )))
}

/// DELETE /api/security/sessions - sign out everywhere else.
pub async fn revoke_other_sessions(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let revoked = state.tokens.revoke_other_sessions(auth_user.id, auth_user.token_id)?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "revoked": revoked }))))
}
