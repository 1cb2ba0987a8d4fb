//! Backends used when no collaborator URL is configured.

use futures::future::BoxFuture;

use crate::{
    dao::{
        collaborator::{CollaboratorError, CollaboratorResult},
        music::{
            CatalogResolver, CommentaryAudio, CommentaryRequest, CommentaryService, SongCandidate,
            SuggestionService, Suggestions,
        },
    },
    state::game::Song,
};

/// Refuses every free-text query.
#[derive(Debug, Clone, Default)]
pub struct OfflineSuggestions;

impl SuggestionService for OfflineSuggestions {
    fn suggest(&self, _query: String) -> BoxFuture<'static, CollaboratorResult<Suggestions>> {
        Box::pin(async { Err(CollaboratorError::Disabled("suggestion service")) })
    }
}

/// Accepts candidates that already know their release year.
#[derive(Debug, Clone, Default)]
pub struct OfflineCatalog;

impl CatalogResolver for OfflineCatalog {
    fn resolve(
        &self,
        candidate: SongCandidate,
    ) -> BoxFuture<'static, CollaboratorResult<Option<Song>>> {
        Box::pin(async move {
            Ok(candidate.year.map(|year| Song {
                id: offline_song_id(&candidate.artist, &candidate.title),
                title: candidate.title,
                artist: candidate.artist,
                year,
                cover_url: None,
                preview_url: None,
            }))
        })
    }
}

/// Never produces audio.
#[derive(Debug, Clone, Default)]
pub struct OfflineCommentary;

impl CommentaryService for OfflineCommentary {
    fn narrate(
        &self,
        _request: CommentaryRequest,
    ) -> BoxFuture<'static, CollaboratorResult<CommentaryAudio>> {
        Box::pin(async { Err(CollaboratorError::Disabled("commentary service")) })
    }
}

fn offline_song_id(artist: &str, title: &str) -> String {
    let slug: String = format!("{artist} {title}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("offline:{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalog_needs_a_year() {
        let catalog = OfflineCatalog;
        let dated = SongCandidate {
            title: "Heroes".into(),
            artist: "David Bowie".into(),
            year: Some(1977),
        };
        let song = catalog.resolve(dated).await.unwrap().unwrap();
        assert_eq!(song.year, 1977);
        assert_eq!(song.id, "offline:david-bowie-heroes");

        let undated = SongCandidate {
            title: "Unknown".into(),
            artist: "Nobody".into(),
            year: None,
        };
        assert!(catalog.resolve(undated).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn suggestions_are_disabled() {
        let err = OfflineSuggestions.suggest("80s".into()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Disabled(_)));
    }
}
