//! Websocket protocol: client actions and server pushes, JSON with a `type` tag.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::music::CommentaryAudio,
    dto::{
        room::{PlayerSnapshot, RoomSnapshot, RoundResultDto, SongSnapshot},
        validation::{validate_not_blank, validate_room_code, validate_year_range},
    },
    error::{ErrorKind, ServiceError},
    state::{
        game::{Song, YearRange},
        registry::CloseReason,
    },
};

/// Messages accepted from websocket clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open a room; the sender becomes its master.
    CreateRoom,
    /// Take a seat as a player.
    JoinRoom(JoinRoomRequest),
    /// Master picks the songs.
    CommitPreferences {
        /// Either resolved songs or a theme.
        preferences: PreferencesInput,
    },
    /// Master deals the first song.
    StartGame,
    /// Player tenders a slot for the current song.
    PlaceCard {
        /// Slot index on the player's timeline.
        position: usize,
    },
    /// Master reveals the round without waiting for every player.
    ForceReveal,
    /// Master deals the next song.
    NextRound,
    /// Master ends the game early.
    EndGame,
    /// Take a player seat back after a drop.
    ReconnectPlayer(ReconnectPlayerRequest),
    /// Take the master seat back after a drop.
    ReconnectMaster(ReconnectMasterRequest),
    /// Leave the current room.
    LeaveRoom,
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(raw)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ClientMessage::JoinRoom(request) => request.validate(),
            ClientMessage::CommitPreferences { preferences } => preferences.validate(),
            ClientMessage::ReconnectPlayer(request) => request.validate(),
            ClientMessage::ReconnectMaster(request) => request.validate(),
            _ => Ok(()),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom => "createRoom",
            ClientMessage::JoinRoom(_) => "joinRoom",
            ClientMessage::CommitPreferences { .. } => "commitPreferences",
            ClientMessage::StartGame => "startGame",
            ClientMessage::PlaceCard { .. } => "placeCard",
            ClientMessage::ForceReveal => "forceReveal",
            ClientMessage::NextRound => "nextRound",
            ClientMessage::EndGame => "endGame",
            ClientMessage::ReconnectPlayer(_) => "reconnectPlayer",
            ClientMessage::ReconnectMaster(_) => "reconnectMaster",
            ClientMessage::LeaveRoom => "leaveRoom",
        }
    }
}

/// Payload of `joinRoom`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room code, any case.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    /// Name shown to the room.
    #[validate(length(min = 1, max = 32), custom(function = "validate_not_blank"))]
    pub display_name: String,
    /// Identity to reuse; generated by the server when absent.
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub persistent_id: Option<String>,
    /// Profile store id to copy avatar data from.
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub profile_ref: Option<String>,
}

/// Payload of `reconnectPlayer`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPlayerRequest {
    /// Room code, any case.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    /// Identity received privately at join time.
    #[validate(length(min = 1, max = 128))]
    pub persistent_id: String,
}

/// Payload of `reconnectMaster`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectMasterRequest {
    /// Room code, any case.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    /// Secret from `roomCreated`.
    #[validate(length(min = 1, max = 64))]
    pub master_identity: String,
}

/// Song selection sent by the master.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PreferencesInput {
    /// Songs already resolved by the client.
    PreResolved(PreResolvedPreferences),
    /// A theme handed to the suggestion service.
    FreeText(FreeTextPreferences),
}

impl Validate for PreferencesInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            PreferencesInput::PreResolved(songs) => songs.validate(),
            PreferencesInput::FreeText(query) => query.validate(),
        }
    }
}

/// Deck resolved on the master device.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreResolvedPreferences {
    /// Songs to shuffle into the deck.
    #[validate(length(min = 1, max = 500), nested)]
    pub songs: Vec<SongInput>,
    /// Range for start anchors; the configured default when absent.
    #[serde(default)]
    #[validate(custom(function = "validate_year_range"))]
    pub start_year_range: Option<YearRange>,
    /// Deck description.
    #[serde(default)]
    #[validate(length(max = 80))]
    pub label: Option<String>,
}

/// Theme to resolve through the suggestion service.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextPreferences {
    /// What the master typed.
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub query: String,
}

/// Song provided directly by the master.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SongInput {
    /// Catalog id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Track title.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Performing artist.
    #[validate(length(min = 1, max = 200))]
    pub artist: String,
    /// Release year.
    #[validate(range(min = 1000, max = 2999))]
    pub year: i32,
    /// Cover art URL.
    #[serde(default)]
    #[validate(url)]
    pub cover_url: Option<String>,
    /// Audio preview URL.
    #[serde(default)]
    #[validate(url)]
    pub preview_url: Option<String>,
}

impl From<SongInput> for Song {
    fn from(input: SongInput) -> Self {
        Self {
            id: input
                .id
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            title: input.title,
            artist: input.artist,
            year: input.year,
            cover_url: input.cover_url,
            preview_url: input.preview_url,
        }
    }
}

/// Which seat a reconnecting connection took back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionRole {
    /// Master seat.
    Master,
    /// Player seat.
    Player,
}

/// Why a room was closed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RoomClosedReason {
    /// Grace period elapsed without the master.
    MasterTimedOut,
    /// Finished room swept after everyone left.
    GameOver,
}

impl From<CloseReason> for RoomClosedReason {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Abandoned => RoomClosedReason::MasterTimedOut,
            CloseReason::Finished => RoomClosedReason::GameOver,
        }
    }
}

/// Messages pushed to websocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once to the master; `master_identity` is never repeated.
    RoomCreated {
        /// Join code.
        code: String,
        /// Secret needed by `reconnectMaster`.
        master_identity: String,
        /// Room after creation.
        state: RoomSnapshot,
    },
    /// Private reply to `joinRoom`.
    Joined {
        /// The new seat.
        player: PlayerSnapshot,
        /// Identity to send back with `reconnectPlayer`. Only ever sent here
        /// and in `reconnected`.
        persistent_id: String,
        /// Room after the join.
        state: RoomSnapshot,
    },
    /// Room changed.
    StateUpdate {
        /// Room after the change.
        state: RoomSnapshot,
    },
    /// Deck installed; the room is in the lobby.
    PreferencesCommitted {
        /// Deck size.
        songs: usize,
        /// Deck description.
        label: Option<String>,
        /// Room after the commit.
        state: RoomSnapshot,
    },
    /// First song dealt.
    GameStarted {
        /// Room with the hidden current song.
        state: RoomSnapshot,
    },
    /// Someone placed a card.
    CardPlaced {
        /// Public id of the player.
        player_id: Uuid,
        /// Chosen slot.
        position: usize,
    },
    /// Round evaluated.
    RoundRevealed {
        /// Song with its year.
        song: SongSnapshot,
        /// One entry per placement.
        results: Vec<RoundResultDto>,
        /// Set once somebody reached the win score.
        winner: Option<PlayerSnapshot>,
        /// Room in the reveal phase.
        state: RoomSnapshot,
    },
    /// Narration for the last reveal.
    CommentaryAudio {
        /// Hosted or inlined audio.
        audio: CommentaryAudio,
    },
    /// Next song dealt.
    RoundStarted {
        /// Room with the hidden current song.
        state: RoomSnapshot,
    },
    /// Game over.
    GameFinished {
        /// Winner, if anyone played.
        winner: Option<PlayerSnapshot>,
        /// Final room state.
        state: RoomSnapshot,
    },
    /// Private reply to a successful reconnect.
    Reconnected {
        /// Seat taken back.
        role: ConnectionRole,
        /// The player seat, for `player` reconnects.
        player: Option<PlayerSnapshot>,
        /// Identity of the player seat, echoed back.
        #[serde(skip_serializing_if = "Option::is_none")]
        persistent_id: Option<String>,
        /// Current room.
        state: RoomSnapshot,
    },
    /// A player's socket dropped.
    PlayerDisconnected {
        /// Public id of the player.
        player_id: Uuid,
        /// Display name of the player.
        display_name: String,
    },
    /// The master's socket dropped; the grace period started.
    MasterDisconnected,
    /// The room is gone.
    RoomClosed {
        /// Join code of the closed room.
        code: String,
        /// Why it closed.
        reason: RoomClosedReason,
    },
    /// Private reply to a refused action.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Build the private error reply for a failed action.
    pub fn error(err: &ServiceError) -> Self {
        ServerMessage::Error {
            kind: err.kind(),
            message: err.client_message(),
        }
    }
}
