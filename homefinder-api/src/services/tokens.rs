use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use homefinder_shared::clients::db::DbPool;
use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::{Claims, UserRole};

use crate::models::{NewSession, Session};
use crate::schema::sessions;

/// Issues JWTs and keeps the sessions table in step with them. Every token
/// gets a session row keyed by its jti, so tokens can be listed and revoked
/// per device.
#[derive(Clone)]
pub struct TokenService {
    db: DbPool,
    jwt_secret: String,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(db: DbPool, jwt_secret: String, ttl_secs: i64) -> Self {
        Self { db, jwt_secret, ttl_secs }
    }

    /// Sign a token for a user and record the matching session.
    pub fn issue(
        &self,
        user_id: Uuid,
        role: UserRole,
        device_name: Option<String>,
        ip_address: Option<String>,
    ) -> AppResult<String> {
        let claims = Claims::new(user_id, role, self.ttl_secs);
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::internal(format!("token signing failed: {e}")))?;

        let expires_at = timestamp_to_datetime(claims.exp);
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        diesel::insert_into(sessions::table)
            .values(NewSession {
                user_id,
                token_id: claims.jti,
                device_name,
                ip_address,
                expires_at,
            })
            .execute(&mut conn)?;

        Ok(token)
    }

    /// Active sessions for a user, most recently used first. Expired rows
    /// are filtered out rather than eagerly deleted.
    pub fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<Session>> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let rows = sessions::table
            .filter(sessions::user_id.eq(user_id))
            .filter(sessions::expires_at.gt(Utc::now()))
            .order(sessions::last_activity.desc())
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Revoke one of the user's sessions by row id.
    pub fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<()> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let deleted = diesel::delete(
            sessions::table
                .filter(sessions::id.eq(session_id))
                .filter(sessions::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;

        if deleted == 0 {
            return Err(AppError::new(ErrorCode::SessionNotFound, "session not found"));
        }
        Ok(())
    }

    /// Revoke every session except the one behind `keep_token_id`.
    pub fn revoke_other_sessions(&self, user_id: Uuid, keep_token_id: Uuid) -> AppResult<usize> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let deleted = diesel::delete(
            sessions::table
                .filter(sessions::user_id.eq(user_id))
                .filter(sessions::token_id.ne(keep_token_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }

    /// Bump last_activity for the session behind a token. Best effort.
    pub fn touch(&self, token_id: Uuid) {
        let Ok(mut conn) = self.db.get() else { return };
        let _ = diesel::update(sessions::table.filter(sessions::token_id.eq(token_id)))
            .set(sessions::last_activity.eq(Utc::now()))
            .execute(&mut conn);
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn issued_claims_decode_with_the_same_secret() {
        let secret = "test-secret";
        let claims = Claims::new(Uuid::new_v4(), UserRole::Buyer, 3600);
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, claims.sub);
        assert_eq!(decoded.claims.jti, claims.jti);
    }

    #[test]
    fn expiry_timestamps_convert_cleanly() {
        let dt = timestamp_to_datetime(1_700_000_000);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
