use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E2xxx: User errors
/// - E3xxx: Property errors
/// - E4xxx: Favorite errors
/// - E5xxx: Messaging errors
/// - E6xxx: Notification errors
/// - E7xxx: Security errors
/// - E8xxx: Upload errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    PayloadTooLarge,
    ServiceUnavailable,

    // Auth (E1xxx)
    InvalidCredentials,
    EmailAlreadyExists,
    TokenExpired,
    TokenInvalid,
    PasswordTooWeak,
    InvalidRole,

    // User (E2xxx)
    UserNotFound,

    // Property (E3xxx)
    PropertyNotFound,
    NotPropertyOwner,

    // Favorite (E4xxx)
    FavoriteNotFound,

    // Messaging (E5xxx)
    RecipientNotFound,
    EmptyMessage,

    // Notification (E6xxx)
    NotificationNotFound,

    // Security (E7xxx)
    TwoFactorNotConfigured,
    TwoFactorCodeInvalid,
    SessionNotFound,

    // Upload (E8xxx)
    NoFileProvided,
    UnsupportedMediaType,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0006",
            Self::PayloadTooLarge => "E0007",
            Self::ServiceUnavailable => "E0008",

            // Auth
            Self::InvalidCredentials => "E1001",
            Self::EmailAlreadyExists => "E1002",
            Self::TokenExpired => "E1003",
            Self::TokenInvalid => "E1004",
            Self::PasswordTooWeak => "E1005",
            Self::InvalidRole => "E1006",

            // User
            Self::UserNotFound => "E2001",

            // Property
            Self::PropertyNotFound => "E3001",
            Self::NotPropertyOwner => "E3002",

            // Favorite
            Self::FavoriteNotFound => "E4001",

            // Messaging
            Self::RecipientNotFound => "E5001",
            Self::EmptyMessage => "E5002",

            // Notification
            Self::NotificationNotFound => "E6001",

            // Security
            Self::TwoFactorNotConfigured => "E7001",
            Self::TwoFactorCodeInvalid => "E7002",
            Self::SessionNotFound => "E7003",

            // Upload
            Self::NoFileProvided => "E8001",
            Self::UnsupportedMediaType => "E8002",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest | Self::PasswordTooWeak
            | Self::InvalidRole | Self::EmptyMessage | Self::NoFileProvided
            | Self::TwoFactorNotConfigured | Self::TwoFactorCodeInvalid => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::UserNotFound | Self::PropertyNotFound
            | Self::FavoriteNotFound | Self::RecipientNotFound
            | Self::NotificationNotFound | Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotPropertyOwner => StatusCode::FORBIDDEN,
            Self::EmailAlreadyExists => StatusCode::CONFLICT,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_errors_map_to_forbidden() {
        assert_eq!(ErrorCode::NotPropertyOwner.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn lookup_errors_map_to_not_found() {
        for code in [
            ErrorCode::PropertyNotFound,
            ErrorCode::UserNotFound,
            ErrorCode::RecipientNotFound,
            ErrorCode::NotificationNotFound,
        ] {
            assert_eq!(code.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::Unauthorized.code(), "E0004");
        assert_eq!(ErrorCode::InvalidCredentials.code(), "E1001");
        assert_eq!(ErrorCode::NotPropertyOwner.code(), "E3002");
    }
}
