//! Turns revealed rounds into spoken commentary pushed to the room.

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        collaborator::CollaboratorError,
        music::{CommentaryLine, CommentaryRequest},
    },
    dto::ws::ServerMessage,
    services::room_events::broadcast_room,
    state::{AppState, SharedState, events::RoomEvent, room::LifecycleState},
};

/// Subscribe now and process events on a background task.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    let receiver = state.events().subscribe();
    tokio::spawn(run(state, receiver))
}

/// Consume room events until the hub is dropped.
pub async fn run(state: SharedState, mut receiver: broadcast::Receiver<RoomEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let state = state.clone();
                tokio::spawn(async move { narrate(&state, event).await });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "commentary listener lagging; rounds skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("commentary listener stopped");
}

/// Request commentary for one event and deliver it if the round is still current.
pub async fn narrate(state: &AppState, event: RoomEvent) {
    let RoomEvent::RoundRevealed {
        code,
        round,
        song,
        results,
        winner_name,
    } = event;

    let request = CommentaryRequest {
        room_code: code.clone(),
        song_title: song.title,
        song_artist: song.artist,
        song_year: song.year,
        results: results.iter().map(CommentaryLine::from).collect(),
        winner_name,
    };

    let limit = state.config().services.commentary_timeout;
    let audio = match timeout(limit, state.collaborators().commentary.narrate(request)).await {
        Ok(Ok(audio)) => audio,
        Ok(Err(CollaboratorError::Disabled(service))) => {
            debug!(code = %code, service, "commentary disabled");
            return;
        }
        Ok(Err(err)) => {
            warn!(code = %code, round, error = %err, "commentary failed");
            return;
        }
        Err(_) => {
            warn!(code = %code, round, "commentary timed out");
            return;
        }
    };

    let Some(room) = state.registry().lookup(&code) else {
        debug!(code = %code, "room closed before commentary arrived");
        return;
    };
    let room = room.lock().await;
    if room.round_number() != round || room.lifecycle() == LifecycleState::Abandoned {
        debug!(code = %code, round, current = room.round_number(), "stale commentary dropped");
        return;
    }
    broadcast_room(state, &room, ServerMessage::CommentaryAudio { audio });
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Instant};

    use futures::future::BoxFuture;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            collaborator::CollaboratorResult,
            music::{CommentaryAudio, CommentaryService},
        },
        state::{
            ClientConnection, Collaborators,
            game::{PlayerProfile, Song, YearRange},
        },
    };

    struct Announcer;

    impl CommentaryService for Announcer {
        fn narrate(
            &self,
            request: CommentaryRequest,
        ) -> BoxFuture<'static, CollaboratorResult<CommentaryAudio>> {
            Box::pin(async move {
                Ok(CommentaryAudio {
                    content_type: "audio/mpeg".into(),
                    url: Some(format!("https://cdn.test/{}.mp3", request.room_code)),
                    data_base64: None,
                })
            })
        }
    }

    fn event(code: &str, round: usize) -> RoomEvent {
        RoomEvent::RoundRevealed {
            code: code.into(),
            round,
            song: Song {
                id: "s".into(),
                title: "Heroes".into(),
                artist: "David Bowie".into(),
                year: 1977,
                cover_url: None,
                preview_url: None,
            },
            results: Vec::new(),
            winner_name: None,
        }
    }

    type Setup = (SharedState, String, mpsc::UnboundedReceiver<ServerMessage>);

    fn setup(collaborators: Collaborators) -> Setup {
        let state = AppState::new(AppConfig::default(), collaborators);
        let (tx, rx) = mpsc::unbounded_channel();
        let master = Uuid::new_v4();
        state
            .connections()
            .insert(master, ClientConnection { id: master, tx });
        let created = state.registry().create(master, Instant::now());
        (state, created.code, rx)
    }

    #[tokio::test]
    async fn current_round_gets_audio() {
        let (state, code, mut rx) = setup(Collaborators {
            commentary: Arc::new(Announcer),
            ..Collaborators::offline()
        });

        narrate(&state, event(&code, 0)).await;
        let Ok(ServerMessage::CommentaryAudio { audio }) = rx.try_recv() else {
            panic!("expected commentary audio");
        };
        assert_eq!(audio.url, Some(format!("https://cdn.test/{code}.mp3")));
    }

    #[tokio::test]
    async fn stale_or_disabled_commentary_is_dropped() {
        let (state, code, mut rx) = setup(Collaborators {
            commentary: Arc::new(Announcer),
            ..Collaborators::offline()
        });
        narrate(&state, event(&code, 4)).await;
        narrate(&state, event("GONE22", 0)).await;
        assert!(rx.try_recv().is_err());

        let (state, code, mut rx) = setup(Collaborators::offline());
        narrate(&state, event(&code, 0)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn final_round_commentary_follows_game_finished() {
        let (state, code, mut rx) = setup(Collaborators {
            commentary: Arc::new(Announcer),
            ..Collaborators::offline()
        });
        let room = state.registry().lookup(&code).unwrap();
        {
            let mut room = room.lock().await;
            let player = Uuid::new_v4();
            room.add_player(player, "a".into(), None, None, PlayerProfile::default())
                .unwrap();
            let song = match event(&code, 1) {
                RoomEvent::RoundRevealed { song, .. } => song,
            };
            let range = YearRange {
                min: 1970,
                max: 1970,
            };
            room.commit_songs(vec![song], Some(range), None).unwrap();
            room.start_game().unwrap();
            room.submit_placement(player, 0).unwrap();
            room.reveal_round().unwrap();
            room.finish_game().unwrap();
            assert_eq!(room.lifecycle(), LifecycleState::Finished);
        }

        narrate(&state, event(&code, 1)).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::CommentaryAudio { .. })
        ));
    }
}
