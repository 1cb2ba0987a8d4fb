//! Process-wide index of live rooms and of the connections bound to them.

use std::{sync::Arc, time::Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    config::GameRules,
    state::{
        game::{ConnectionId, Player},
        room::{LifecycleState, Room, RoomError},
        state_machine::RoomPhase,
    },
};

/// Characters used in room codes. `0/O` and `1/I` are left out.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of a room code.
pub const CODE_LENGTH: usize = 6;

/// Room handle shared between the registry and in-flight handlers.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Failures of registry-level lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No live room under this code.
    #[error("room `{0}` not found")]
    UnknownRoom(String),
    /// The room refused the operation.
    #[error(transparent)]
    Room(#[from] RoomError),
}

/// Result of [`RoomRegistry::create`].
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    /// Join code.
    pub code: String,
    /// Secret for `reconnectMaster`.
    pub master_identity: String,
    /// The new room.
    pub room: SharedRoom,
}

/// What a dropped connection meant for its room.
#[derive(Debug)]
pub enum Departure {
    /// The master left; the grace period started.
    Master {
        /// Room code.
        code: String,
        /// Room the master left.
        room: SharedRoom,
    },
    /// A player left before the game started and was removed.
    PlayerRemoved {
        /// Room code.
        code: String,
        /// Room the player left.
        room: SharedRoom,
        /// The removed seat.
        player: Player,
    },
    /// A player left mid-game and keeps their seat.
    PlayerDisconnected {
        /// Room code.
        code: String,
        /// Room the player dropped from.
        room: SharedRoom,
        /// The seat as it was left.
        player: Player,
    },
}

/// Why the sweeper evicted a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The master did not come back in time.
    Abandoned,
    /// The game ended and everybody left.
    Finished,
}

/// A room removed by [`RoomRegistry::sweep_expired_at`].
#[derive(Debug, Clone)]
pub struct ClosedRoom {
    /// Code of the evicted room.
    pub code: String,
    /// Why it was evicted.
    pub reason: CloseReason,
    /// Connections that were still bound to the room.
    pub connections: Vec<ConnectionId>,
}

/// Index from room codes to rooms and from connections to room codes.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: DashMap<String, SharedRoom>,
    connections: DashMap<ConnectionId, String>,
    rules: GameRules,
}

impl RoomRegistry {
    /// Empty registry; every room opens with `rules`.
    pub fn new(rules: GameRules) -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            rules,
        }
    }

    /// Open a new room under a fresh code, with `master` bound to it.
    pub fn create(&self, master: ConnectionId, now: Instant) -> CreatedRoom {
        loop {
            let code = generate_code();
            if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                let room = Room::new(code.clone(), master, self.rules, now);
                let master_identity = room.master_identity().to_string();
                let room = Arc::new(Mutex::new(room));
                slot.insert(room.clone());
                self.connections.insert(master, code.clone());
                info!(code = %code, connection_id = %master, "room created");
                return CreatedRoom {
                    code,
                    master_identity,
                    room,
                };
            }
        }
    }

    /// Find a room by code, case-insensitively.
    pub fn lookup(&self, code: &str) -> Option<SharedRoom> {
        self.rooms
            .get(&normalize_code(code))
            .map(|entry| entry.value().clone())
    }

    fn require(&self, code: &str) -> Result<SharedRoom, RegistryError> {
        self.lookup(code)
            .ok_or_else(|| RegistryError::UnknownRoom(normalize_code(code)))
    }

    /// Room the connection is currently bound to.
    pub fn lookup_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(String, SharedRoom)> {
        let code = self.connections.get(&connection_id)?.value().clone();
        let room = self.rooms.get(&code)?.value().clone();
        Some((code, room))
    }

    /// Route `connection_id` to the room under `code`.
    pub fn bind_connection(&self, connection_id: ConnectionId, code: &str) {
        self.connections.insert(connection_id, normalize_code(code));
    }

    /// Forget the route of `connection_id`, returning the room code it had.
    pub fn unbind_connection(&self, connection_id: ConnectionId) -> Option<String> {
        self.connections
            .remove(&connection_id)
            .map(|(_, code)| code)
    }

    /// Unbind a dropped connection and update its room.
    ///
    /// Players leaving before the first deal are removed, later ones keep
    /// their seat and progress.
    pub async fn disconnect(&self, connection_id: ConnectionId, now: Instant) -> Option<Departure> {
        let code = self.unbind_connection(connection_id)?;
        let room = self.lookup(&code)?;
        let mut guard = room.lock().await;

        if guard.is_master(connection_id) {
            guard.mark_master_disconnected(now);
            drop(guard);
            info!(code = %code, connection_id = %connection_id, "master disconnected");
            return Some(Departure::Master { code, room });
        }

        if matches!(guard.phase(), RoomPhase::Setup | RoomPhase::Lobby) {
            let player = guard.remove_player(connection_id)?;
            drop(guard);
            info!(code = %code, player_id = %player.persistent_id, "player left the lobby");
            return Some(Departure::PlayerRemoved { code, room, player });
        }

        let player = guard.mark_disconnected(connection_id)?.clone();
        drop(guard);
        info!(code = %code, player_id = %player.persistent_id, "player disconnected");
        Some(Departure::PlayerDisconnected { code, room, player })
    }

    /// Rebind the master of `code` after checking its identity.
    pub async fn reconnect_master(
        &self,
        code: &str,
        identity: &str,
        connection_id: ConnectionId,
        now: Instant,
    ) -> Result<SharedRoom, RegistryError> {
        let room = self.require(code)?;
        let mut guard = room.lock().await;
        let previous = guard.master_connection_id();
        guard.reconnect_master(identity, connection_id, now)?;
        let code = guard.code().to_string();
        drop(guard);

        if let Some(previous) = previous.filter(|previous| *previous != connection_id) {
            self.connections.remove(&previous);
        }
        self.connections.insert(connection_id, code);
        Ok(room)
    }

    /// Rebind a known player of `code` to a new connection.
    pub async fn reconnect_player(
        &self,
        code: &str,
        persistent_id: &str,
        connection_id: ConnectionId,
    ) -> Result<(SharedRoom, Player), RegistryError> {
        let room = self.require(code)?;
        let mut guard = room.lock().await;
        let previous = guard
            .player(persistent_id)
            .and_then(|player| player.connection_id);
        let player = guard.reconnect_player(persistent_id, connection_id)?.clone();
        let code = guard.code().to_string();
        drop(guard);

        if let Some(previous) = previous.filter(|previous| *previous != connection_id) {
            self.connections.remove(&previous);
        }
        self.connections.insert(connection_id, code);
        Ok((room, player))
    }

    /// Drop a room and every connection binding pointing at it.
    pub fn discard(&self, code: &str) -> Option<SharedRoom> {
        let code = normalize_code(code);
        let (_, room) = self.rooms.remove(&code)?;
        self.connections.retain(|_, bound| *bound != code);
        Some(room)
    }

    /// Evict abandoned rooms, and finished rooms everyone left, as of `now`.
    pub async fn sweep_expired_at(&self, now: Instant) -> Vec<ClosedRoom> {
        let candidates: Vec<(String, SharedRoom)> = self
            .rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut closed = Vec::new();
        for (code, room) in candidates {
            let mut guard = room.lock().await;
            if !guard.is_expired(now) {
                continue;
            }
            let reason = match guard.lifecycle() {
                LifecycleState::Finished => CloseReason::Finished,
                _ => CloseReason::Abandoned,
            };
            guard.mark_abandoned();
            let connections = guard.connection_ids();
            drop(guard);

            self.discard(&code);
            debug!(code = %code, ?reason, "room evicted");
            closed.push(ClosedRoom {
                code,
                reason,
                connections,
            });
        }
        closed
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is live.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Upper-case a code typed by a user.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Whether `code` is shaped like a room code, ignoring case.
pub fn is_code_shaped(code: &str) -> bool {
    let code = normalize_code(code);
    code.len() == CODE_LENGTH && code.bytes().all(|byte| CODE_ALPHABET.contains(&byte))
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::state::game::{PlayerProfile, Song};

    fn registry() -> RoomRegistry {
        RoomRegistry::new(GameRules::default())
    }

    async fn join(room: &SharedRoom, registry: &RoomRegistry, name: &str) -> ConnectionId {
        let connection = Uuid::new_v4();
        let mut guard = room.lock().await;
        guard
            .add_player(
                connection,
                name.into(),
                Some(format!("pid-{name}")),
                None,
                PlayerProfile::default(),
            )
            .unwrap();
        registry.bind_connection(connection, guard.code());
        connection
    }

    async fn start(room: &SharedRoom) {
        let mut guard = room.lock().await;
        let song = Song {
            id: "s".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            year: 1999,
            cover_url: None,
            preview_url: None,
        };
        guard.commit_songs(vec![song], None, None).unwrap();
        guard.start_game().unwrap();
    }

    #[test]
    fn codes_are_well_formed() {
        for _ in 0..64 {
            let code = generate_code();
            assert!(is_code_shaped(&code), "{code}");
        }
        assert!(is_code_shaped("abcdef"));
        assert!(!is_code_shaped("ABCDE0"));
        assert!(!is_code_shaped("ABCDE"));
    }

    #[tokio::test]
    async fn create_binds_master_and_lookup_ignores_case() {
        let registry = registry();
        let master = Uuid::new_v4();
        let created = registry.create(master, Instant::now());

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&created.code.to_lowercase()).is_some());
        let (code, _) = registry.lookup_by_connection(master).unwrap();
        assert_eq!(code, created.code);
        assert!(registry.lookup("NOPE00").is_none());
    }

    #[tokio::test]
    async fn lobby_disconnect_removes_player() {
        let registry = registry();
        let created = registry.create(Uuid::new_v4(), Instant::now());
        let player = join(&created.room, &registry, "a").await;

        let departure = registry.disconnect(player, Instant::now()).await.unwrap();
        assert!(matches!(departure, Departure::PlayerRemoved { .. }));
        assert_eq!(created.room.lock().await.players().count(), 0);
        assert!(registry.lookup_by_connection(player).is_none());
    }

    #[tokio::test]
    async fn mid_game_disconnect_keeps_seat_and_reconnect_rebinds() {
        let registry = registry();
        let created = registry.create(Uuid::new_v4(), Instant::now());
        let player = join(&created.room, &registry, "a").await;
        start(&created.room).await;

        let departure = registry.disconnect(player, Instant::now()).await.unwrap();
        assert!(matches!(departure, Departure::PlayerDisconnected { .. }));

        let fresh = Uuid::new_v4();
        let (_, player) = registry
            .reconnect_player(&created.code, "pid-a", fresh)
            .await
            .unwrap();
        assert!(player.connected);
        assert_eq!(registry.lookup_by_connection(fresh).unwrap().0, created.code);

        let unknown = registry
            .reconnect_player(&created.code, "pid-zz", Uuid::new_v4())
            .await;
        assert!(matches!(
            unknown,
            Err(RegistryError::Room(RoomError::UnknownPlayer(_)))
        ));
    }

    #[tokio::test]
    async fn master_reconnect_within_grace() {
        let registry = registry();
        let start = Instant::now();
        let master = Uuid::new_v4();
        let created = registry.create(master, start);

        assert!(matches!(
            registry.disconnect(master, start).await,
            Some(Departure::Master { .. })
        ));

        let bad = registry
            .reconnect_master(&created.code, "nope", Uuid::new_v4(), start)
            .await;
        assert!(matches!(
            bad,
            Err(RegistryError::Room(RoomError::MasterIdentityMismatch))
        ));

        let back = Uuid::new_v4();
        let later = start + Duration::from_secs(9 * 60);
        registry
            .reconnect_master(&created.code, &created.master_identity, back, later)
            .await
            .unwrap();
        let much_later = later + Duration::from_secs(3600);
        assert!(registry.sweep_expired_at(much_later).await.is_empty());
        assert!(created.room.lock().await.is_master(back));
    }

    #[tokio::test]
    async fn abandoned_room_is_swept_and_then_unknown() {
        let registry = registry();
        let start = Instant::now();
        let master = Uuid::new_v4();
        let created = registry.create(master, start);
        let player = join(&created.room, &registry, "a").await;
        registry.disconnect(master, start).await;

        let within_grace = start + Duration::from_secs(9 * 60);
        assert!(registry.sweep_expired_at(within_grace).await.is_empty());
        let closed = registry
            .sweep_expired_at(start + Duration::from_secs(11 * 60))
            .await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::Abandoned);
        assert_eq!(closed[0].connections, vec![player]);

        assert!(registry.is_empty());
        assert!(registry.lookup_by_connection(player).is_none());
        let late = registry
            .reconnect_master(
                &created.code,
                &created.master_identity,
                Uuid::new_v4(),
                start + Duration::from_secs(12 * 60),
            )
            .await;
        assert!(matches!(late, Err(RegistryError::UnknownRoom(_))));
    }
}
