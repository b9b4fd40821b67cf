use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    ai_conversations, favorites, messages, notifications, properties, sessions, users,
};

pub const PROPERTY_TYPES: [&str; 4] = ["apartment", "house", "villa", "studio"];
pub const TRANSACTION_TYPES: [&str; 2] = ["sale", "rent"];

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    #[serde(skip_serializing)]
    pub two_factor_backup_codes: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
}

// --- Property ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = properties)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub transaction_type: String,
    pub price: f64,
    pub surface: f64,
    pub rooms: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub images: Vec<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = properties)]
pub struct NewProperty {
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub transaction_type: String,
    pub price: f64,
    pub surface: f64,
    pub rooms: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub images: Vec<String>,
    pub owner_id: Uuid,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = properties)]
pub struct PropertyChangeset {
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub transaction_type: String,
    pub price: f64,
    pub surface: f64,
    pub rooms: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

// --- Favorite ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = favorites)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = favorites)]
pub struct NewFavorite {
    pub user_id: Uuid,
    pub property_id: Uuid,
}

// --- Message ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub property_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub property_id: Option<Uuid>,
}

// --- Notification ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// --- Presence ---

#[derive(Debug, Queryable, Serialize, Clone)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub socket_id: Option<String>,
}

// --- Session ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_id: Uuid,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

// --- AI conversation ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = ai_conversations)]
pub struct AiConversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_message: String,
    pub ai_response: String,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ai_conversations)]
pub struct NewAiConversation {
    pub user_id: Uuid,
    pub user_message: String,
    pub ai_response: String,
    pub context: Option<serde_json::Value>,
}

// --- Public views ---

/// User shape safe to return to clients (and to other users in buyer lists).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            avatar: user.avatar,
            role: user.role,
            created_at: user.created_at,
        }
    }
}
