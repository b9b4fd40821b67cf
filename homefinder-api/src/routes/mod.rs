pub mod ai;
pub mod auth;
pub mod favorites;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod properties;
pub mod security;
pub mod uploads;
