//! The room registry: creation, lookup, deletion, and expiry cleanup.
//!
//! The registry is an explicitly started instance, not a global. It owns
//! the directory of live rooms and one consumer task that:
//!
//! - drains the **cleanup queue** (room ids whose TTL fired) and closes
//!   those rooms, and
//! - drains the **closed channel** (room ids that finished closing, for any
//!   reason) and drops their directory entries.
//!
//! Expiry timers never close a room themselves; they only enqueue its id.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use huddle_protocol::RoomId;
use rand::Rng;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::{Candidate, CloseCause, Room, RoomConfig};

/// Random bytes in a room id (hex-encoded to twice as many characters).
const ROOM_ID_BYTES: usize = 6;

/// Directory of live rooms plus the task that retires them.
pub struct RoomRegistry {
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    config: RoomConfig,
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    cleanup_tx: mpsc::Sender<RoomId>,
    closed_tx: mpsc::UnboundedSender<RoomId>,
}

impl RoomRegistry {
    /// Creates an empty registry and spawns its consumer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RoomConfig) -> Self {
        let (cleanup_tx, cleanup_rx) = mpsc::channel(config.cleanup_queue_capacity.max(1));
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            rooms: RwLock::new(HashMap::new()),
            cleanup_tx,
            closed_tx,
        });
        let consumer = tokio::spawn(run_consumer(Arc::downgrade(&shared), cleanup_rx, closed_rx));
        tracing::info!("room registry started");

        Self {
            shared,
            consumer: Mutex::new(Some(consumer)),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.shared.config
    }

    /// Creates a room with `admin` pre-joined as participant 1 and returns
    /// its id. The room closes itself `config.ttl` from now.
    pub async fn create_room(&self, secret: String, capacity: usize, admin: Candidate) -> RoomId {
        let config = &self.shared.config;
        let mut rooms = self.shared.rooms.write().await;

        let id = loop {
            let id = RoomId::new(random_room_id());
            if !rooms.contains_key(&id) {
                break id;
            }
        };

        let ttl_secs = i64::try_from(config.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);
        let expiry = spawn_expiry_timer(id.clone(), config.ttl, self.shared.cleanup_tx.clone());

        let room = Room::new(
            id.clone(),
            secret,
            capacity,
            admin,
            expires_at,
            expiry,
            config.clone(),
            self.shared.closed_tx.clone(),
        );
        rooms.insert(id.clone(), room);

        tracing::info!(room_id = %id, capacity, rooms = rooms.len(), "room created");
        id
    }

    pub async fn get_room(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.shared.rooms.read().await.get(id).cloned()
    }

    /// Removes the directory entry only. The room itself is untouched; call
    /// [`Room::close`] to tear it down.
    pub async fn delete_room(&self, id: &RoomId) -> Option<Arc<Room>> {
        let removed = self.shared.rooms.write().await.remove(id);
        if removed.is_some() {
            tracing::info!(room_id = %id, "room deleted");
        }
        removed
    }

    pub async fn room_count(&self) -> usize {
        self.shared.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.shared.rooms.read().await.keys().cloned().collect()
    }

    /// Closes every room as if it had expired and stops the consumer task.
    pub async fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> = self
            .shared
            .rooms
            .write()
            .await
            .drain()
            .map(|(_, room)| room)
            .collect();
        tracing::info!(rooms = rooms.len(), "room registry shutting down");

        join_all(rooms.iter().map(|room| room.close(CloseCause::Scheduled))).await;

        if let Some(consumer) = self.consumer.lock().await.take() {
            consumer.abort();
        }
    }
}

impl Drop for RoomRegistry {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.get_mut().take() {
            consumer.abort();
        }
    }
}

fn random_room_id() -> String {
    let bytes: [u8; ROOM_ID_BYTES] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn spawn_expiry_timer(id: RoomId, ttl: Duration, cleanup_tx: mpsc::Sender<RoomId>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        tracing::debug!(room_id = %id, "room expired");
        if cleanup_tx.send(id).await.is_err() {
            tracing::debug!("registry gone, expiry dropped");
        }
    })
}

async fn run_consumer(
    shared: Weak<Shared>,
    mut cleanup_rx: mpsc::Receiver<RoomId>,
    mut closed_rx: mpsc::UnboundedReceiver<RoomId>,
) {
    loop {
        tokio::select! {
            Some(id) = cleanup_rx.recv() => {
                let Some(shared) = shared.upgrade() else { break };
                let room = shared.rooms.read().await.get(&id).cloned();
                match room {
                    // Closing awaits every connection's close frame, so it
                    // runs off the consumer.
                    Some(room) => {
                        tokio::spawn(async move {
                            room.close(CloseCause::Scheduled).await;
                        });
                    }
                    None => tracing::debug!(room_id = %id, "expired room already gone"),
                }
            }
            Some(id) = closed_rx.recv() => {
                let Some(shared) = shared.upgrade() else { break };
                if shared.rooms.write().await.remove(&id).is_some() {
                    tracing::info!(room_id = %id, "closed room removed");
                }
            }
            else => break,
        }
    }
    tracing::debug!("room registry consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_room_id_is_twelve_hex_chars() {
        let id = random_room_id();
        assert_eq!(id.len(), ROOM_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let registry = RoomRegistry::start(RoomConfig::default());
        let id = registry
            .create_room("secret".into(), 3, Candidate::new("s-admin", "admin"))
            .await;

        let room = registry.get_room(&id).await.expect("room should exist");
        assert_eq!(room.id(), &id);
        assert_eq!(room.capacity(), 3);
        assert!(room.secret_matches("secret"));
        assert_eq!(registry.room_ids().await, vec![id.clone()]);

        assert!(registry.delete_room(&id).await.is_some());
        assert!(registry.delete_room(&id).await.is_none());
        assert!(registry.get_room(&id).await.is_none());
    }
}
