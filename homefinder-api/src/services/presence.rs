use chrono::{DateTime, Utc};
use dashmap::DashMap;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use homefinder_shared::clients::db::DbPool;
use homefinder_shared::errors::{AppError, AppResult};

use crate::models::PresenceRecord;
use crate::schema::user_presence;

/// Live user -> socket id map. One entry per user; a reconnect overwrites
/// the previous socket id (last writer wins).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns true when the user was offline
    /// before, i.e. this connect is an offline-to-online transition.
    pub fn open(&self, user_id: Uuid, socket_id: &str) -> bool {
        self.connections.insert(user_id, socket_id.to_string()).is_none()
    }

    /// Record a disconnect. Only removes the entry when `socket_id` is
    /// still the current one, so a stale disconnect arriving after a
    /// reconnect is a no-op. Returns true when the user actually went
    /// offline.
    pub fn close(&self, user_id: Uuid, socket_id: &str) -> bool {
        self.connections
            .remove_if(&user_id, |_, current| current == socket_id)
            .is_some()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn socket_id(&self, user_id: Uuid) -> Option<String> {
        self.connections.get(&user_id).map(|entry| entry.clone())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Presence bookkeeping: the registry answers "online right now", the
/// user_presence table carries last_seen across restarts.
#[derive(Clone)]
pub struct PresenceService {
    db: DbPool,
    registry: std::sync::Arc<ConnectionRegistry>,
}

impl PresenceService {
    pub fn new(db: DbPool, registry: std::sync::Arc<ConnectionRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a connect. Returns true when this is an offline-to-online
    /// transition (the caller broadcasts user-online exactly then).
    pub fn connection_opened(&self, user_id: Uuid, socket_id: &str) -> AppResult<bool> {
        let was_offline = self.registry.open(user_id, socket_id);
        self.upsert(user_id, true, Some(socket_id))?;
        Ok(was_offline)
    }

    /// Register a disconnect. Returns true when the user actually went
    /// offline (the caller broadcasts user-offline exactly then).
    pub fn connection_closed(&self, user_id: Uuid, socket_id: &str) -> AppResult<bool> {
        if !self.registry.close(user_id, socket_id) {
            // Superseded socket; the user is still online elsewhere.
            return Ok(false);
        }
        self.upsert(user_id, false, None)?;
        Ok(true)
    }

    /// Live status for a user: the in-memory registry wins; last_seen
    /// comes from the persisted row when offline.
    pub fn status(&self, user_id: Uuid) -> AppResult<UserStatus> {
        if self.registry.is_online(user_id) {
            return Ok(UserStatus {
                user_id,
                is_online: true,
                last_seen: None,
            });
        }

        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let record: Option<PresenceRecord> = user_presence::table
            .find(user_id)
            .first(&mut conn)
            .optional()?;

        Ok(UserStatus {
            user_id,
            is_online: false,
            last_seen: record.map(|r| r.last_seen),
        })
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.registry.is_online(user_id)
    }

    fn upsert(&self, user_id: Uuid, is_online: bool, socket_id: Option<&str>) -> AppResult<()> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let now = Utc::now();

        diesel::insert_into(user_presence::table)
            .values((
                user_presence::user_id.eq(user_id),
                user_presence::is_online.eq(is_online),
                user_presence::last_seen.eq(now),
                user_presence::socket_id.eq(socket_id),
            ))
            .on_conflict(user_presence::user_id)
            .do_update()
            .set((
                user_presence::is_online.eq(is_online),
                user_presence::last_seen.eq(now),
                user_presence::socket_id.eq(socket_id),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connect_is_a_transition() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        assert!(registry.open(user, "sid-1"));
        assert!(registry.is_online(user));
    }

    #[test]
    fn reconnect_is_not_a_transition() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        assert!(registry.open(user, "sid-1"));
        assert!(!registry.open(user, "sid-2"));
        assert_eq!(registry.socket_id(user).as_deref(), Some("sid-2"));
    }

    #[test]
    fn stale_disconnect_after_reconnect_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        registry.open(user, "sid-1");
        registry.open(user, "sid-2");

        // The old socket's disconnect arrives late; sid-2 is current.
        assert!(!registry.close(user, "sid-1"));
        assert!(registry.is_online(user));

        assert!(registry.close(user, "sid-2"));
        assert!(!registry.is_online(user));
    }

    #[test]
    fn device_switch_registers_before_the_old_socket_closes() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        registry.open(user, "sid-1");

        // New device registers first, then the superseded socket is kicked
        // and its disconnect fires. No offline (and so no re-online)
        // broadcast happens across the switch.
        assert!(!registry.open(user, "sid-2"));
        assert!(!registry.close(user, "sid-1"));
        assert!(registry.is_online(user));
        assert_eq!(registry.socket_id(user).as_deref(), Some("sid-2"));
    }

    #[test]
    fn close_of_unknown_user_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.close(Uuid::new_v4(), "sid-1"));
    }

    #[test]
    fn exactly_one_transition_per_direction() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let mut online_broadcasts = 0;
        let mut offline_broadcasts = 0;

        for sid in ["a", "b", "c"] {
            if registry.open(user, sid) {
                online_broadcasts += 1;
            }
        }
        for sid in ["a", "b", "c"] {
            if registry.close(user, sid) {
                offline_broadcasts += 1;
            }
        }

        assert_eq!(online_broadcasts, 1);
        assert_eq!(offline_broadcasts, 1);
    }
}
