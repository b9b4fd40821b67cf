use std::sync::Arc;

use diesel::prelude::*;
use serde::Serialize;
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use homefinder_shared::errors::ErrorCode;
use homefinder_shared::types::auth::Claims;

use crate::models::{NewMessage, PublicUser, User};
use crate::schema::{messages, users};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);

    // Register this socket as current before touching superseded ones, so
    // their disconnect handlers see themselves as stale and stay silent.
    let came_online = match state.presence.connection_opened(user_id, &socket.id.to_string()) {
        Ok(transition) => transition,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "presence open failed");
            false
        }
    };

    // A user gets one live socket: anything still sitting in the room is a
    // superseded connection and is closed before this one takes over.
    let room = user_room(user_id);
    if let Ok(stale) = state.io.to(room.clone()).sockets() {
        for old in stale {
            tracing::debug!(user_id = %user_id, sid = %old.id, "closing superseded socket");
            old.disconnect().ok();
        }
    }
    socket.join(room).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket connected");

    if came_online {
        // Offline-to-online transition: exactly one broadcast
        let _ = state
            .io
            .emit("user-online", &serde_json::json!({ "userId": user_id }));
    }

    socket.on("check-user-status", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move { on_check_user_status(socket, payload, &state); }
        }
    });

    socket.on("typing", |socket: SocketRef, Data::<serde_json::Value>(payload)| async move {
        relay_typing(&socket, &payload, "user-typing");
    });

    socket.on("stop-typing", |socket: SocketRef, Data::<serde_json::Value>(payload)| async move {
        relay_typing(&socket, &payload, "user-stop-typing");
    });

    socket.on("new-message", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move { on_new_message(socket, payload, &state); }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move { on_disconnect_with_state(socket, state); }
        }
    });
}

fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket disconnected");

    match state.presence.connection_closed(user_id, &socket.id.to_string()) {
        Ok(true) => {
            let _ = state
                .io
                .emit("user-offline", &serde_json::json!({ "userId": user_id }));
        }
        Ok(false) => {
            // Stale disconnect of a superseded socket; the user is still online
        }
        Err(e) => tracing::warn!(user_id = %user_id, error = %e, "presence close failed"),
    }
}

/// Answer a status query on the asking socket only.
fn on_check_user_status(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let Some(target) = parse_uuid_field(&payload, "userId") else {
        tracing::warn!("check-user-status missing userId");
        return;
    };

    match state.presence.status(target) {
        Ok(status) => {
            let _ = socket.emit(
                "user-status",
                &serde_json::json!({
                    "userId": status.user_id,
                    "isOnline": status.is_online,
                    "lastSeen": status.last_seen,
                }),
            );
        }
        Err(e) => tracing::warn!(target = %target, error = %e, "status lookup failed"),
    }
}

/// Forward a typing indicator to the recipient's room. Ephemeral: nothing
/// is persisted, offline recipients simply miss it.
fn relay_typing(socket: &SocketRef, payload: &serde_json::Value, event: &'static str) {
    let Some(sender) = get_user_id(socket) else { return };
    let Some(receiver) = parse_uuid_field(payload, "receiverId") else {
        tracing::warn!(event = event, "typing event missing receiverId");
        return;
    };

    let _ = socket
        .to(user_room(receiver))
        .emit(event, &serde_json::json!({ "userId": sender }));
}

/// Socket-side message send: same persistence path as the REST endpoint,
/// then live delivery or a durable notification.
fn on_new_message(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let Some(sender_id) = get_user_id(&socket) else { return };

    let Some(receiver_id) = parse_uuid_field(&payload, "receiverId") else {
        let _ = socket.emit(
            "error",
            &ErrorPayload {
                code: ErrorCode::RecipientNotFound.code().into(),
                message: "receiverId is required".into(),
            },
        );
        return;
    };
    let content = payload
        .get("content")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        let _ = socket.emit(
            "error",
            &ErrorPayload {
                code: ErrorCode::EmptyMessage.code().into(),
                message: "message content must not be empty".into(),
            },
        );
        return;
    }
    let property_id = parse_uuid_field(&payload, "propertyId");

    let result = (|| {
        let mut conn = state
            .db
            .get()
            .map_err(|e| homefinder_shared::errors::AppError::internal(e.to_string()))?;

        let sender: User = users::table.find(sender_id).first(&mut conn)?;

        let message: crate::models::Message = diesel::insert_into(messages::table)
            .values(NewMessage {
                sender_id,
                receiver_id,
                content: content.to_string(),
                property_id,
            })
            .get_result(&mut conn)?;

        state.notifier.deliver_or_notify(&message, &PublicUser::from(sender))?;
        Ok::<_, homefinder_shared::errors::AppError>(message)
    })();

    match result {
        Ok(message) => {
            tracing::debug!(message_id = %message.id, sender = %sender_id, "socket message stored");
        }
        Err(e) => {
            tracing::error!(sender = %sender_id, error = %e, "socket message failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: ErrorCode::InternalError.code().into(),
                    message: "failed to send message".into(),
                },
            );
        }
    }
}

fn parse_uuid_field(payload: &serde_json::Value, field: &str) -> Option<Uuid> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    // Handshake carries the JWT as ?token=xxx
    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" {
                Some(value.to_string())
            } else {
                None
            }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    if token_data.claims.is_expired() {
        return Err("token has expired".into());
    }

    Ok(token_data.claims.sub)
}
