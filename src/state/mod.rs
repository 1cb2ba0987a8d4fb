/// Room events for background listeners.
pub mod events;
/// Songs, players and round outcomes.
pub mod game;
/// Code-to-room and connection-to-room index.
pub mod registry;
pub mod room;
/// Phase graph with deferred transitions.
pub mod state_machine;
/// Per-player ordered card row.
pub mod timeline;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    dao::{
        music::{
            CatalogResolver, CommentaryService, SuggestionService,
            offline::{OfflineCatalog, OfflineCommentary, OfflineSuggestions},
        },
        profile_store::{ProfileStore, memory::InMemoryProfileStore},
    },
    dto::ws::ServerMessage,
    error::ServiceError,
    state::{
        events::RoomEventHub,
        game::ConnectionId,
        registry::{RoomRegistry, SharedRoom},
        room::Room,
    },
};

/// Reference-counted handle to [`AppState`].
pub type SharedState = Arc<AppState>;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    /// Connection id.
    pub id: ConnectionId,
    /// Queue drained by the socket writer task.
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// External services the game talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Turns free-text themes into candidates.
    pub suggestions: Arc<dyn SuggestionService>,
    /// Resolves candidates into songs.
    pub catalog: Arc<dyn CatalogResolver>,
    /// Narrates revealed rounds.
    pub commentary: Arc<dyn CommentaryService>,
    /// Player profiles copied at join time.
    pub profiles: Arc<dyn ProfileStore>,
}

impl Collaborators {
    /// Backends that need no network: no suggestions, no commentary, an empty
    /// in-memory profile store, and a catalog that trusts dated candidates.
    pub fn offline() -> Self {
        Self {
            suggestions: Arc::new(OfflineSuggestions),
            catalog: Arc::new(OfflineCatalog),
            commentary: Arc::new(OfflineCommentary),
            profiles: Arc::new(InMemoryProfileStore::new()),
        }
    }
}

/// Central application state: the room registry, live connections and collaborators.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: RoomRegistry,
    connections: DashMap<ConnectionId, ClientConnection>,
    collaborators: Collaborators,
    events: RoomEventHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> SharedState {
        Arc::new(Self {
            registry: RoomRegistry::new(config.rules),
            config: Arc::new(config),
            connections: DashMap::new(),
            collaborators,
            events: RoomEventHub::new(EVENT_CAPACITY),
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Live rooms.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Live websocket connections keyed by their identifier.
    pub fn connections(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.connections
    }

    /// External services.
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Hub carrying room events to background listeners.
    pub fn events(&self) -> &RoomEventHub {
        &self.events
    }

    /// Room the connection is currently bound to.
    pub fn room_for_connection(
        &self,
        connection_id: ConnectionId,
    ) -> Result<SharedRoom, ServiceError> {
        self.registry
            .lookup_by_connection(connection_id)
            .map(|(_, room)| room)
            .ok_or_else(|| ServiceError::NotFound("this connection is not in a room".into()))
    }

    /// Run `f` under the lock of `room`.
    ///
    /// `f` is synchronous so the lock is never held across a suspension point.
    pub async fn with_room<T>(
        &self,
        room: &SharedRoom,
        f: impl FnOnce(&mut Room) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut guard = room.lock().await;
        f(&mut guard)
    }

    /// [`Self::with_room`] on the room bound to `connection_id`.
    pub async fn with_connection_room<T>(
        &self,
        connection_id: ConnectionId,
        f: impl FnOnce(&mut Room) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let room = self.room_for_connection(connection_id)?;
        self.with_room(&room, f).await
    }
}
