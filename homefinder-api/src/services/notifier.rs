use diesel::prelude::*;
use socketioxide::SocketIo;
use uuid::Uuid;

use homefinder_shared::clients::db::DbPool;
use homefinder_shared::errors::{AppError, AppResult};

use crate::models::{Message, NewNotification, Notification, PublicUser};
use crate::schema::notifications;
use crate::services::presence::PresenceService;

fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// How a freshly stored message reaches its recipient. Exactly one branch
/// per message: a connected recipient gets the live event, a disconnected
/// one gets a durable notification row.
#[derive(Debug, PartialEq)]
enum DeliveryPlan {
    Live(serde_json::Value),
    Notify {
        title: String,
        body: String,
        data: serde_json::Value,
    },
}

fn plan_delivery(message: &Message, sender_name: &str, recipient_online: bool) -> DeliveryPlan {
    if recipient_online {
        DeliveryPlan::Live(serde_json::json!({
            "id": message.id,
            "senderId": message.sender_id,
            "senderName": sender_name,
            "receiverId": message.receiver_id,
            "content": message.content,
            "propertyId": message.property_id,
            "createdAt": message.created_at,
        }))
    } else {
        DeliveryPlan::Notify {
            title: format!("New message from {sender_name}"),
            body: message.content.clone(),
            data: serde_json::json!({
                "messageId": message.id,
                "senderId": message.sender_id,
                "propertyId": message.property_id,
            }),
        }
    }
}

/// Persists notifications and pushes them to connected clients.
///
/// Persistence comes first and is authoritative: a failed insert aborts the
/// whole operation, a failed push only logs. Clients that miss the push
/// still see the row on their next fetch.
#[derive(Clone)]
pub struct NotifierService {
    db: DbPool,
    io: SocketIo,
    presence: PresenceService,
}

impl NotifierService {
    pub fn new(db: DbPool, io: SocketIo, presence: PresenceService) -> Self {
        Self { db, io, presence }
    }

    /// Create a durable notification, then best-effort push it to the
    /// recipient's room.
    pub fn notify(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> AppResult<Notification> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;

        let notification: Notification = diesel::insert_into(notifications::table)
            .values(NewNotification {
                user_id,
                notification_type: notification_type.to_string(),
                title: title.to_string(),
                message: message.to_string(),
                data,
            })
            .get_result(&mut conn)?;

        let payload = serde_json::json!({
            "id": notification.id,
            "type": notification.notification_type,
            "title": notification.title,
            "message": notification.message,
            "data": notification.data,
            "createdAt": notification.created_at,
        });
        if let Err(e) = self.io.to(user_room(user_id)).emit("notification", &payload) {
            tracing::warn!(user_id = %user_id, error = %e, "notification push failed");
        }

        Ok(notification)
    }

    /// Deliver a freshly stored message: live "message-received" push when
    /// the recipient is connected, durable notification otherwise.
    pub fn deliver_or_notify(&self, message: &Message, sender: &PublicUser) -> AppResult<()> {
        let online = self.presence.is_online(message.receiver_id);
        match plan_delivery(message, &sender.name, online) {
            DeliveryPlan::Live(payload) => {
                if let Err(e) = self
                    .io
                    .to(user_room(message.receiver_id))
                    .emit("message-received", &payload)
                {
                    tracing::warn!(
                        message_id = %message.id,
                        error = %e,
                        "live message delivery failed"
                    );
                }
            }
            DeliveryPlan::Notify { title, body, data } => {
                self.notify(message.receiver_id, "new_message", &title, &body, Some(data))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_message() -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            content: "Is the apartment still available?".to_string(),
            property_id: Some(Uuid::new_v4()),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn online_recipient_gets_a_live_push_and_no_notification() {
        let message = sample_message();
        let plan = plan_delivery(&message, "Sami", true);

        let DeliveryPlan::Live(payload) = plan else {
            panic!("expected a live delivery");
        };
        assert_eq!(payload["senderName"], "Sami");
        assert_eq!(payload["content"], message.content);
        assert_eq!(payload["receiverId"], serde_json::json!(message.receiver_id));
    }

    #[test]
    fn offline_recipient_gets_exactly_one_durable_notification() {
        let message = sample_message();
        let plan = plan_delivery(&message, "Sami", false);

        let DeliveryPlan::Notify { title, body, data } = plan else {
            panic!("expected a durable notification");
        };
        assert_eq!(title, "New message from Sami");
        assert_eq!(body, message.content);
        assert_eq!(data["messageId"], serde_json::json!(message.id));
        assert_eq!(data["senderId"], serde_json::json!(message.sender_id));
    }
}
