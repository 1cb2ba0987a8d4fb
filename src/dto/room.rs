use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::{
        game::{Player, RoundResult, Song, YearRange},
        room::{LifecycleState, Room},
        state_machine::RoomPhase,
    },
};

/// Room phase as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum VisiblePhase {
    /// Waiting for the master to pick songs.
    Setup,
    /// Deck committed, players gathering.
    Lobby,
    /// A song is being guessed.
    Playing,
    /// Results of the last round are shown.
    Reveal,
    /// A winner has been declared.
    Finished,
}

impl From<RoomPhase> for VisiblePhase {
    fn from(phase: RoomPhase) -> Self {
        match phase {
            RoomPhase::Setup => VisiblePhase::Setup,
            RoomPhase::Lobby => VisiblePhase::Lobby,
            RoomPhase::Playing => VisiblePhase::Playing,
            RoomPhase::Reveal => VisiblePhase::Reveal,
            RoomPhase::Finished => VisiblePhase::Finished,
        }
    }
}

/// Master presence as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum VisibleLifecycle {
    /// Master connected.
    Active,
    /// Master dropped; grace period running.
    AwaitingMaster,
    /// Game over.
    Finished,
    /// Master never came back.
    Abandoned,
}

impl From<LifecycleState> for VisibleLifecycle {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Active => VisibleLifecycle::Active,
            LifecycleState::AwaitingMaster => VisibleLifecycle::AwaitingMaster,
            LifecycleState::Finished => VisibleLifecycle::Finished,
            LifecycleState::Abandoned => VisibleLifecycle::Abandoned,
        }
    }
}

/// Song card. `year` is withheld while the song is being guessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SongSnapshot {
    /// Catalog identifier.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Release year, `null` while guessing.
    pub year: Option<i32>,
    /// Cover art.
    pub cover_url: Option<String>,
    /// Audio preview.
    pub preview_url: Option<String>,
}

impl SongSnapshot {
    /// Snapshot with the release year shown.
    pub fn revealed(song: &Song) -> Self {
        Self {
            id: song.id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            year: Some(song.year),
            cover_url: song.cover_url.clone(),
            preview_url: song.preview_url.clone(),
        }
    }

    /// Snapshot with the release year withheld.
    pub fn hidden(song: &Song) -> Self {
        Self {
            year: None,
            ..Self::revealed(song)
        }
    }
}

/// Public view of a player.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Public id; cannot be used to reconnect.
    pub id: Uuid,
    /// Name chosen at join time.
    pub display_name: String,
    /// Avatar color from the profile store.
    pub avatar_color: Option<String>,
    /// Generated stage name.
    pub artist_name: Option<String>,
    /// Generated music style.
    pub music_style: Option<String>,
    /// Generated profile picture.
    pub profile_image: Option<String>,
    /// Anchor year of the timeline.
    pub start_year: i32,
    /// Correct placements so far.
    pub score: u32,
    /// Whether the player has nothing left to do this round.
    pub is_ready: bool,
    /// Liveness of the player's socket.
    pub connected: bool,
    /// Placed cards, ascending by year.
    pub timeline: Vec<SongSnapshot>,
    /// RFC 3339 join time.
    pub joined_at: String,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            id: player.public_id,
            display_name: player.display_name.clone(),
            avatar_color: player.profile.avatar_color.clone(),
            artist_name: player.profile.artist_name.clone(),
            music_style: player.profile.music_style.clone(),
            profile_image: player.profile.profile_image.clone(),
            start_year: player.start_year,
            score: player.score,
            is_ready: player.is_ready,
            connected: player.connected,
            timeline: player
                .timeline
                .cards()
                .iter()
                .map(SongSnapshot::revealed)
                .collect(),
            joined_at: format_system_time(player.joined_at),
        }
    }
}

/// Outcome of one placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultDto {
    /// Public id of the player.
    pub player_id: Uuid,
    /// Display name of the player.
    pub player_name: String,
    /// Whether the card landed in a valid slot.
    pub correct: bool,
    /// Slot the player chose.
    pub placed_position: usize,
    /// Release year of the song.
    pub actual_year: i32,
}

impl From<&RoundResult> for RoundResultDto {
    fn from(result: &RoundResult) -> Self {
        Self {
            player_id: result.player_id,
            player_name: result.player_name.clone(),
            correct: result.correct,
            placed_position: result.placed_position,
            actual_year: result.actual_year,
        }
    }
}

/// Full room state pushed to every member after each change.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Join code.
    pub code: String,
    /// Game phase.
    pub phase: VisiblePhase,
    /// Master presence.
    pub lifecycle: VisibleLifecycle,
    /// Whether a master socket is bound.
    pub master_connected: bool,
    /// Songs dealt so far.
    pub round_number: usize,
    /// Songs in the committed deck.
    pub deck_size: usize,
    /// Deck description.
    pub deck_label: Option<String>,
    /// Committed start year range.
    pub start_year_range: Option<YearRange>,
    /// Score that ends the game.
    pub win_score: u32,
    /// Song in play or just revealed.
    pub current_song: Option<SongSnapshot>,
    /// Players in join order.
    pub players: Vec<PlayerSnapshot>,
    /// Public id of the winner.
    pub winner_id: Option<Uuid>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        let current_song = room.current_song().map(|song| {
            if room.phase() == RoomPhase::Playing {
                SongSnapshot::hidden(song)
            } else {
                SongSnapshot::revealed(song)
            }
        });

        Self {
            code: room.code().to_string(),
            phase: room.phase().into(),
            lifecycle: room.lifecycle().into(),
            master_connected: room.master_connection_id().is_some(),
            round_number: room.round_number(),
            deck_size: room.song_deck().len(),
            deck_label: room.deck_label().map(str::to_string),
            start_year_range: room.start_year_range(),
            win_score: room.rules().win_score,
            current_song,
            players: room.players().map(PlayerSnapshot::from).collect(),
            winner_id: room.winner().map(|player| player.public_id),
            created_at: format_system_time(room.created_at()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use uuid::Uuid;

    use super::*;
    use crate::{config::GameRules, state::game::PlayerProfile};

    fn room() -> Room {
        Room::new(
            "ABCDEF".into(),
            Uuid::new_v4(),
            GameRules::default(),
            Instant::now(),
        )
    }

    #[test]
    fn year_is_hidden_only_while_playing() {
        let mut room = room();
        let player = Uuid::new_v4();
        room.add_player(player, "a".into(), None, None, PlayerProfile::default())
            .unwrap();
        let song = Song {
            id: "s1".into(),
            title: "Title".into(),
            artist: "Artist".into(),
            year: 1984,
            cover_url: None,
            preview_url: None,
        };
        room.commit_songs(vec![song], None, None).unwrap();
        room.start_game().unwrap();

        let playing = RoomSnapshot::from(&room);
        assert_eq!(playing.phase, VisiblePhase::Playing);
        assert_eq!(playing.current_song.unwrap().year, None);

        room.submit_placement(player, 0).unwrap();
        room.reveal_round().unwrap();
        let reveal = RoomSnapshot::from(&room);
        assert_eq!(reveal.current_song.unwrap().year, Some(1984));
    }

    #[test]
    fn snapshot_serializes_in_camel_case() {
        let room = room();
        let json = serde_json::to_value(RoomSnapshot::from(&room)).unwrap();
        assert_eq!(json["phase"], "setup");
        assert_eq!(json["masterConnected"], true);
        assert!(json["players"].as_array().unwrap().is_empty());
    }

    #[test]
    fn persistent_ids_stay_out_of_snapshots() {
        let mut room = room();
        room.add_player(
            Uuid::new_v4(),
            "a".into(),
            Some("seat-secret".into()),
            None,
            PlayerProfile::default(),
        )
        .unwrap();
        room.finish_game().unwrap();

        let snapshot = RoomSnapshot::from(&room);
        let public_id = room.player("seat-secret").unwrap().public_id;
        assert_eq!(snapshot.players[0].id, public_id);
        assert_eq!(snapshot.winner_id, Some(public_id));
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("seat-secret"));
    }
}
