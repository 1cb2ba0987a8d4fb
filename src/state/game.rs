use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::timeline::Timeline;

/// Transient identifier of a live websocket connection.
pub type ConnectionId = Uuid;

/// A playable track dealt as one round of the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    /// Catalog identifier of the track.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Release year; the value players have to guess.
    pub year: i32,
    /// Cover art shown while the song plays.
    pub cover_url: Option<String>,
    /// Short audio preview streamed to the devices.
    pub preview_url: Option<String>,
}

/// Inclusive range of years from which start anchors are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct YearRange {
    /// Lowest year (inclusive).
    pub min: i32,
    /// Highest year (inclusive).
    pub max: i32,
}

impl YearRange {
    /// Whether `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

/// Display identity copied from the profile store when a player joins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerProfile {
    /// Avatar color as stored by the profile service (CSS color string).
    pub avatar_color: Option<String>,
    /// AI-generated stage name.
    pub artist_name: Option<String>,
    /// AI-generated music style blurb.
    pub music_style: Option<String>,
    /// Reference to the generated profile picture.
    pub profile_image: Option<String>,
}

/// Card tendered by a player for the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlacement {
    /// Song the placement refers to.
    pub song: Song,
    /// Slot index chosen on the player's timeline.
    pub position: usize,
}

/// Participant of a room, keyed by a persistent identity.
#[derive(Debug, Clone)]
pub struct Player {
    /// Current live connection, if any.
    pub connection_id: Option<ConnectionId>,
    /// Stable identity round-tripped by the client to reconnect. Secret to
    /// the owning device; never broadcast.
    pub persistent_id: String,
    /// Id shown to the rest of the room.
    pub public_id: Uuid,
    /// Optional id into the external profile store.
    pub profile_reference: Option<String>,
    /// Name chosen at join time.
    pub display_name: String,
    /// Profile fields fetched once at join time.
    pub profile: PlayerProfile,
    /// Correctly placed songs, ascending by year.
    pub timeline: Timeline,
    /// Anchor for the first placement.
    pub start_year: i32,
    /// Number of correct placements.
    pub score: u32,
    /// Round in which the current score was reached.
    pub scored_in_round: Option<usize>,
    /// Whether the player already placed the current song.
    pub is_ready: bool,
    /// Placement waiting for evaluation.
    pub pending_placement: Option<PendingPlacement>,
    /// Liveness flag, independent from readiness.
    pub connected: bool,
    /// Wall-clock join time, for display.
    pub joined_at: SystemTime,
}

impl Player {
    /// Build a freshly joined, connected player.
    pub fn new(
        connection_id: ConnectionId,
        persistent_id: String,
        display_name: String,
        profile_reference: Option<String>,
        profile: PlayerProfile,
        start_year: i32,
    ) -> Self {
        Self {
            connection_id: Some(connection_id),
            persistent_id,
            public_id: Uuid::new_v4(),
            profile_reference,
            display_name,
            profile,
            timeline: Timeline::new(),
            start_year,
            score: 0,
            scored_in_round: None,
            is_ready: false,
            pending_placement: None,
            connected: true,
            joined_at: SystemTime::now(),
        }
    }
}

/// Outcome of one player's placement in an evaluated round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// Public id of the player.
    pub player_id: Uuid,
    /// Display name of the player.
    pub player_name: String,
    /// Whether the placement was correct.
    pub correct: bool,
    /// Slot the player chose.
    pub placed_position: usize,
    /// Actual release year of the song.
    pub actual_year: i32,
}
