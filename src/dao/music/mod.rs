//! Song suggestion, catalog lookup and commentary collaborators.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    dao::collaborator::CollaboratorResult,
    state::game::{RoundResult, Song, YearRange},
};

/// HTTP clients for the music collaborators.
#[cfg(feature = "http-services")]
pub mod http;
/// Network-free fallbacks.
pub mod offline;

/// A song proposed by the suggestion service, not yet checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongCandidate {
    /// Suggested title.
    pub title: String,
    /// Suggested artist.
    pub artist: String,
    /// Release year, when the suggestion service knows it.
    #[serde(default)]
    pub year: Option<i32>,
}

/// Answer of the suggestion service for a free-text theme.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    /// Songs matching the theme.
    pub candidates: Vec<SongCandidate>,
    /// Range fitting the theme, if the service proposes one.
    #[serde(default)]
    pub start_year_range: Option<YearRange>,
    /// Short name of the theme, shown in the lobby.
    #[serde(default)]
    pub label: Option<String>,
}

/// Track as returned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTrack {
    /// Catalog identifier.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Release year.
    pub year: i32,
    /// Cover art URL.
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Audio preview URL.
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl From<CatalogTrack> for Song {
    fn from(track: CatalogTrack) -> Self {
        Self {
            id: track.id,
            title: track.title,
            artist: track.artist,
            year: track.year,
            cover_url: track.cover_url,
            preview_url: track.preview_url,
        }
    }
}

/// What the commentator is asked to talk about after a reveal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryRequest {
    /// Room the commentary is for.
    pub room_code: String,
    /// Title of the revealed song.
    pub song_title: String,
    /// Artist of the revealed song.
    pub song_artist: String,
    /// Release year of the revealed song.
    pub song_year: i32,
    /// How every placement went.
    pub results: Vec<CommentaryLine>,
    /// Set when the reveal decided the game.
    pub winner_name: Option<String>,
}

/// One player's outcome in a [`CommentaryRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryLine {
    /// Display name of the player.
    pub player_name: String,
    /// Whether the placement was right.
    pub correct: bool,
}

impl From<&RoundResult> for CommentaryLine {
    fn from(result: &RoundResult) -> Self {
        Self {
            player_name: result.player_name.clone(),
            correct: result.correct,
        }
    }
}

/// Synthesized commentary, either hosted or inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryAudio {
    /// MIME type of the audio, e.g. `audio/mpeg`.
    pub content_type: String,
    /// Where the audio is hosted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Audio inlined as base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
}

/// Turns a free-text theme into song candidates.
pub trait SuggestionService: Send + Sync {
    /// Candidates for `query`.
    fn suggest(&self, query: String) -> BoxFuture<'static, CollaboratorResult<Suggestions>>;
}

/// Resolves candidates into playable songs. `None` means the catalog has no match.
pub trait CatalogResolver: Send + Sync {
    /// Playable song for `candidate`, if the catalog has it.
    fn resolve(
        &self,
        candidate: SongCandidate,
    ) -> BoxFuture<'static, CollaboratorResult<Option<Song>>>;
}

/// Produces spoken commentary for a revealed round.
pub trait CommentaryService: Send + Sync {
    /// Audio commentary for one reveal.
    fn narrate(
        &self,
        request: CommentaryRequest,
    ) -> BoxFuture<'static, CollaboratorResult<CommentaryAudio>>;
}
