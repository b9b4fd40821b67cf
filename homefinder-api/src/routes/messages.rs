use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::pagination::{Paginated, PaginationParams};
use homefinder_shared::types::ApiResponse;

use crate::models::{Message, NewMessage, PublicUser, User};
use crate::schema::{messages, users};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
    pub property_id: Option<Uuid>,
}

/// One row per conversation partner, derived from the flat messages table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub partner: PublicUser,
    pub last_message: Message,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

/// GET /api/messages/conversations - partners ordered by most recent
/// exchange. There is no conversations table; the view is folded from the
/// caller's messages.
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let all: Vec<Message> = messages::table
        .filter(
            messages::sender_id
                .eq(auth_user.id)
                .or(messages::receiver_id.eq(auth_user.id)),
        )
        .order(messages::created_at.desc())
        .load(&mut conn)?;

    // First message per partner is the latest one; count unread along the way
    let mut last_by_partner: Vec<(Uuid, Message)> = Vec::new();
    let mut unread_by_partner: HashMap<Uuid, i64> = HashMap::new();
    for message in all {
        let partner_id = if message.sender_id == auth_user.id {
            message.receiver_id
        } else {
            message.sender_id
        };
        if message.receiver_id == auth_user.id && !message.is_read {
            *unread_by_partner.entry(partner_id).or_default() += 1;
        }
        if !last_by_partner.iter().any(|(id, _)| *id == partner_id) {
            last_by_partner.push((partner_id, message));
        }
    }

    let partner_ids: Vec<Uuid> = last_by_partner.iter().map(|(id, _)| *id).collect();
    let partners: HashMap<Uuid, User> = users::table
        .filter(users::id.eq_any(&partner_ids))
        .load::<User>(&mut conn)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let summaries = last_by_partner
        .into_iter()
        .filter_map(|(partner_id, last_message)| {
            let partner = partners.get(&partner_id)?.clone();
            Some(ConversationSummary {
                partner: PublicUser::from(partner),
                unread_count: unread_by_partner.get(&partner_id).copied().unwrap_or(0),
                last_message,
            })
        })
        .collect();

    Ok(Json(ApiResponse::ok(summaries)))
}

/// GET /api/messages/with/:user_id - the two-party thread, newest first.
pub async fn get_thread(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Message>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let between = |me: Uuid, them: Uuid| {
        messages::sender_id
            .eq(me)
            .and(messages::receiver_id.eq(them))
            .or(messages::sender_id.eq(them).and(messages::receiver_id.eq(me)))
    };

    let total: i64 = messages::table
        .filter(between(auth_user.id, partner_id))
        .select(count_star())
        .first(&mut conn)?;

    let items: Vec<Message> = messages::table
        .filter(between(auth_user.id, partner_id))
        .order(messages::created_at.desc())
        .offset(params.offset())
        .limit(params.limit())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

/// POST /api/messages - store-then-deliver. Persistence always happens;
/// delivery is a live push when the recipient is connected, a durable
/// notification otherwise.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::new(ErrorCode::EmptyMessage, "message content must not be empty"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let recipient_exists: i64 = users::table
        .filter(users::id.eq(req.receiver_id))
        .select(count_star())
        .first(&mut conn)?;
    if recipient_exists == 0 {
        return Err(AppError::new(ErrorCode::RecipientNotFound, "recipient not found"));
    }

    let sender: User = users::table.find(auth_user.id).first(&mut conn)?;

    let message: Message = diesel::insert_into(messages::table)
        .values(NewMessage {
            sender_id: auth_user.id,
            receiver_id: req.receiver_id,
            content: content.to_string(),
            property_id: req.property_id,
        })
        .get_result(&mut conn)?;

    state.notifier.deliver_or_notify(&message, &PublicUser::from(sender))?;

    tracing::debug!(message_id = %message.id, sender = %auth_user.id, "message sent");

    Ok(Json(ApiResponse::ok(message)))
}

/// PUT /api/messages/with/:user_id/read - mark everything received from
/// that partner as read.
pub async fn mark_thread_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let updated = diesel::update(
        messages::table
            .filter(messages::sender_id.eq(partner_id))
            .filter(messages::receiver_id.eq(auth_user.id))
            .filter(messages::is_read.eq(false)),
    )
    .set(messages::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({ "marked": updated }))))
}

/// GET /api/messages/unread-count
pub async fn unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total_unread: i64 = messages::table
        .filter(messages::receiver_id.eq(auth_user.id))
        .filter(messages::is_read.eq(false))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { total_unread })))
}
