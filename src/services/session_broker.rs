//! Routes client actions to rooms, authorizes them and fans results out.
//!
//! Every handler follows the same shape: resolve the room, mutate it inside a
//! synchronous closure under the room lock, and queue the resulting messages
//! before the lock is released. Collaborator calls happen with no lock held.

use std::time::Instant;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    dao::collaborator::CollaboratorError,
    dto::{
        room::{PlayerSnapshot, RoomSnapshot, SongSnapshot},
        ws::{
            ClientMessage, ConnectionRole, JoinRoomRequest, PreferencesInput,
            ReconnectMasterRequest, ReconnectPlayerRequest, ServerMessage,
        },
    },
    error::{ErrorKind, ServiceError},
    services::room_events::{
        broadcast_room, broadcast_room_except, broadcast_state, send_private,
    },
    state::{
        AppState,
        events::RoomEvent,
        game::{ConnectionId, PlayerProfile, Song, YearRange},
        registry::{Departure, SharedRoom},
        room::{LifecycleState, Room},
        state_machine::RoomPhase,
    },
};

/// Handle one validated client action, replying privately on failure.
pub async fn handle_message(state: &AppState, connection_id: ConnectionId, message: ClientMessage) {
    let action = message.name();
    debug!(connection_id = %connection_id, action, "handling client action");

    if let Err(err) = dispatch(state, connection_id, message).await {
        reject(state, connection_id, action, &err);
    }
}

/// Report a failed action to its sender only.
pub fn reject(state: &AppState, connection_id: ConnectionId, action: &str, err: &ServiceError) {
    if err.kind() == ErrorKind::CollaboratorFailure {
        warn!(connection_id = %connection_id, action, error = %err, "action failed");
    } else {
        info!(connection_id = %connection_id, action, error = %err, "action rejected");
    }
    send_private(state, connection_id, ServerMessage::error(err));
}

async fn dispatch(
    state: &AppState,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::CreateRoom => create_room(state, connection_id).await,
        ClientMessage::JoinRoom(request) => join_room(state, connection_id, request).await,
        ClientMessage::CommitPreferences { preferences } => {
            commit_preferences(state, connection_id, preferences).await
        }
        ClientMessage::StartGame => start_game(state, connection_id).await,
        ClientMessage::PlaceCard { position } => place_card(state, connection_id, position).await,
        ClientMessage::ForceReveal => force_reveal(state, connection_id).await,
        ClientMessage::NextRound => next_round(state, connection_id).await,
        ClientMessage::EndGame => end_game(state, connection_id).await,
        ClientMessage::ReconnectPlayer(request) => {
            reconnect_player(state, connection_id, request).await
        }
        ClientMessage::ReconnectMaster(request) => {
            reconnect_master(state, connection_id, request).await
        }
        ClientMessage::LeaveRoom => {
            state.room_for_connection(connection_id)?;
            handle_disconnect(state, connection_id).await;
            Ok(())
        }
    }
}

fn ensure_unbound(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    match state.registry().lookup_by_connection(connection_id) {
        Some((code, _)) => Err(ServiceError::InvalidInput(format!(
            "this connection already belongs to room `{code}`; leave it first"
        ))),
        None => Ok(()),
    }
}

fn authorize_master(
    room: &mut Room,
    connection_id: ConnectionId,
    action: &str,
) -> Result<(), ServiceError> {
    if !room.is_master(connection_id) {
        return Err(ServiceError::Unauthorized(format!(
            "only the master can {action}"
        )));
    }
    room.touch_master(Instant::now());
    Ok(())
}

// ---------------------------------------------------------------------------
// Room membership
// ---------------------------------------------------------------------------

async fn create_room(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    ensure_unbound(state, connection_id)?;
    let created = state.registry().create(connection_id, Instant::now());

    state
        .with_room(&created.room, |room| {
            send_private(
                state,
                connection_id,
                ServerMessage::RoomCreated {
                    code: created.code.clone(),
                    master_identity: created.master_identity.clone(),
                    state: RoomSnapshot::from(&*room),
                },
            );
            Ok(())
        })
        .await
}

async fn join_room(
    state: &AppState,
    connection_id: ConnectionId,
    request: JoinRoomRequest,
) -> Result<(), ServiceError> {
    ensure_unbound(state, connection_id)?;

    let profile = match request.profile_ref.clone() {
        Some(reference) => fetch_profile(state, reference).await,
        None => PlayerProfile::default(),
    };

    // Looked up after the profile fetch so an evicted room is never joined.
    let room = state
        .registry()
        .lookup(&request.code)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{}` not found", request.code)))?;

    state
        .with_room(&room, |room| {
            let player = room.add_player(
                connection_id,
                request.display_name.trim().to_string(),
                request.persistent_id,
                request.profile_ref,
                profile,
            )?;
            let persistent_id = player.persistent_id.clone();
            let player = PlayerSnapshot::from(player);
            state.registry().bind_connection(connection_id, room.code());
            info!(code = %room.code(), player_id = %player.id, "player joined");

            let snapshot = RoomSnapshot::from(&*room);
            send_private(
                state,
                connection_id,
                ServerMessage::Joined {
                    player,
                    persistent_id,
                    state: snapshot.clone(),
                },
            );
            broadcast_room_except(
                state,
                room,
                connection_id,
                ServerMessage::StateUpdate { state: snapshot },
            );
            Ok(())
        })
        .await
}

/// Copy display data from the profile store. Failures degrade to an empty profile.
async fn fetch_profile(state: &AppState, reference: String) -> PlayerProfile {
    let limit = state.config().services.request_timeout;
    let profiles = state.collaborators().profiles.clone();

    match timeout(limit, profiles.find_profile(reference.clone())).await {
        Ok(Ok(Some(profile))) => {
            let touch = profiles.touch(reference.clone());
            tokio::spawn(async move {
                if let Err(err) = touch.await {
                    warn!(profile_ref = %reference, error = %err, "failed to touch profile");
                }
            });
            profile.into()
        }
        Ok(Ok(None)) => {
            info!(profile_ref = %reference, "profile not found; joining without it");
            PlayerProfile::default()
        }
        Ok(Err(err)) => {
            warn!(profile_ref = %reference, error = %err, "profile lookup failed");
            PlayerProfile::default()
        }
        Err(_) => {
            warn!(profile_ref = %reference, "profile lookup timed out");
            PlayerProfile::default()
        }
    }
}

async fn reconnect_player(
    state: &AppState,
    connection_id: ConnectionId,
    request: ReconnectPlayerRequest,
) -> Result<(), ServiceError> {
    ensure_unbound(state, connection_id)?;
    let (room, player) = state
        .registry()
        .reconnect_player(&request.code, &request.persistent_id, connection_id)
        .await?;
    info!(code = %request.code, player_id = %player.persistent_id, "player reconnected");

    state
        .with_room(&room, |room| {
            let snapshot = RoomSnapshot::from(&*room);
            send_private(
                state,
                connection_id,
                ServerMessage::Reconnected {
                    role: ConnectionRole::Player,
                    player: room.player(&request.persistent_id).map(PlayerSnapshot::from),
                    persistent_id: Some(request.persistent_id.clone()),
                    state: snapshot.clone(),
                },
            );
            broadcast_room_except(
                state,
                room,
                connection_id,
                ServerMessage::StateUpdate { state: snapshot },
            );
            Ok(())
        })
        .await
}

async fn reconnect_master(
    state: &AppState,
    connection_id: ConnectionId,
    request: ReconnectMasterRequest,
) -> Result<(), ServiceError> {
    ensure_unbound(state, connection_id)?;
    let room = state
        .registry()
        .reconnect_master(
            &request.code,
            &request.master_identity,
            connection_id,
            Instant::now(),
        )
        .await?;
    info!(code = %request.code, connection_id = %connection_id, "master reconnected");

    state
        .with_room(&room, |room| {
            let snapshot = RoomSnapshot::from(&*room);
            send_private(
                state,
                connection_id,
                ServerMessage::Reconnected {
                    role: ConnectionRole::Master,
                    player: None,
                    persistent_id: None,
                    state: snapshot.clone(),
                },
            );
            broadcast_room_except(
                state,
                room,
                connection_id,
                ServerMessage::StateUpdate { state: snapshot },
            );
            Ok(())
        })
        .await
}

/// Apply the consequences of a dropped or leaving connection.
pub async fn handle_disconnect(state: &AppState, connection_id: ConnectionId) {
    let Some(departure) = state
        .registry()
        .disconnect(connection_id, Instant::now())
        .await
    else {
        return;
    };

    match departure {
        Departure::Master { room, .. } => {
            let room = room.lock().await;
            broadcast_room(state, &room, ServerMessage::MasterDisconnected);
            broadcast_state(state, &room);
        }
        Departure::PlayerRemoved { room, player, .. } => {
            let room = room.lock().await;
            broadcast_room(
                state,
                &room,
                ServerMessage::PlayerDisconnected {
                    player_id: player.public_id,
                    display_name: player.display_name,
                },
            );
            broadcast_state(state, &room);
        }
        Departure::PlayerDisconnected { room, player, .. } => {
            let mut room = room.lock().await;
            broadcast_room(
                state,
                &room,
                ServerMessage::PlayerDisconnected {
                    player_id: player.public_id,
                    display_name: player.display_name,
                },
            );
            // The leaver may have been the last one holding up the round.
            if room.phase() == RoomPhase::Playing && room.all_ready() {
                if let Err(err) = reveal(state, &mut room) {
                    warn!(code = %room.code(), error = %err, "failed to reveal after disconnect");
                }
            } else {
                broadcast_state(state, &room);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Song selection
// ---------------------------------------------------------------------------

struct ResolvedDeck {
    songs: Vec<Song>,
    range: Option<YearRange>,
    label: Option<String>,
}

async fn commit_preferences(
    state: &AppState,
    connection_id: ConnectionId,
    preferences: PreferencesInput,
) -> Result<(), ServiceError> {
    let room = state.room_for_connection(connection_id)?;

    match preferences {
        PreferencesInput::PreResolved(input) => {
            state
                .with_room(&room, |room| {
                    authorize_master(room, connection_id, "commit songs")?;
                    let songs = input.songs.into_iter().map(Song::from).collect();
                    room.commit_songs(songs, input.start_year_range, input.label)?;
                    announce_commit(state, room);
                    Ok(())
                })
                .await
        }
        PreferencesInput::FreeText(input) => {
            commit_free_text(state, connection_id, room, input.query).await
        }
    }
}

async fn commit_free_text(
    state: &AppState,
    connection_id: ConnectionId,
    room: SharedRoom,
    query: String,
) -> Result<(), ServiceError> {
    let plan_id = state
        .with_room(&room, |room| {
            authorize_master(room, connection_id, "commit songs")?;
            Ok(room.plan_commit()?)
        })
        .await?;

    let resolved = resolve_free_text(state, query).await;

    state
        .with_room(&room, |room| {
            if room.lifecycle() == LifecycleState::Abandoned {
                room.abort_commit(plan_id);
                return Err(ServiceError::NotFound(format!(
                    "room `{}` was closed",
                    room.code()
                )));
            }
            match resolved {
                Ok(deck) => {
                    room.apply_commit(plan_id, deck.songs, deck.range, deck.label)?;
                    announce_commit(state, room);
                    Ok(())
                }
                Err(err) => {
                    room.abort_commit(plan_id);
                    Err(err)
                }
            }
        })
        .await
}

/// Ask for suggestions, then resolve every candidate concurrently.
///
/// Candidates the catalog cannot place are dropped.
async fn resolve_free_text(state: &AppState, query: String) -> Result<ResolvedDeck, ServiceError> {
    let limit = state.config().services.request_timeout;
    let collaborators = state.collaborators().clone();

    let suggestions = timeout(limit, collaborators.suggestions.suggest(query.clone()))
        .await
        .map_err(|_| ServiceError::Timeout("suggestion service"))??;

    let lookups = suggestions.candidates.into_iter().map(|candidate| {
        let catalog = collaborators.catalog.clone();
        async move {
            let title = candidate.title.clone();
            match timeout(limit, catalog.resolve(candidate)).await {
                Ok(Ok(song)) => song,
                Ok(Err(err)) => {
                    debug!(title = %title, error = %err, "candidate dropped");
                    None
                }
                Err(_) => {
                    debug!(title = %title, "catalog lookup timed out; candidate dropped");
                    None
                }
            }
        }
    });
    let songs: Vec<Song> = join_all(lookups).await.into_iter().flatten().collect();

    if songs.is_empty() {
        return Err(CollaboratorError::InvalidResponse {
            service: "catalog",
            message: "no suggested song could be resolved".into(),
        }
        .into());
    }

    info!(query = %query, resolved = songs.len(), "resolved free-text preferences");
    Ok(ResolvedDeck {
        songs,
        range: suggestions.start_year_range.filter(YearRange::is_valid),
        label: suggestions.label.or(Some(query)),
    })
}

fn announce_commit(state: &AppState, room: &Room) {
    info!(code = %room.code(), songs = room.song_deck().len(), "songs committed");
    broadcast_room(
        state,
        room,
        ServerMessage::PreferencesCommitted {
            songs: room.song_deck().len(),
            label: room.deck_label().map(str::to_string),
            state: RoomSnapshot::from(room),
        },
    );
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

async fn start_game(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    state
        .with_connection_room(connection_id, |room| {
            authorize_master(room, connection_id, "start the game")?;
            room.start_game()?;
            info!(code = %room.code(), players = room.players().count(), "game started");
            broadcast_room(
                state,
                room,
                ServerMessage::GameStarted {
                    state: RoomSnapshot::from(&*room),
                },
            );
            Ok(())
        })
        .await
}

async fn place_card(
    state: &AppState,
    connection_id: ConnectionId,
    position: usize,
) -> Result<(), ServiceError> {
    state
        .with_connection_room(connection_id, |room| {
            let player_id = room
                .submit_placement(connection_id, position)?
                .public_id;
            broadcast_room(
                state,
                room,
                ServerMessage::CardPlaced {
                    player_id,
                    position,
                },
            );

            if room.all_ready() {
                reveal(state, room)?;
            }
            Ok(())
        })
        .await
}

async fn force_reveal(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    state
        .with_connection_room(connection_id, |room| {
            authorize_master(room, connection_id, "reveal the round")?;
            reveal(state, room)
        })
        .await
}

/// Evaluate the round, broadcast the answer and hand it to background listeners.
fn reveal(state: &AppState, room: &mut Room) -> Result<(), ServiceError> {
    let reveal = room.reveal_round()?;

    broadcast_room(
        state,
        room,
        ServerMessage::RoundRevealed {
            song: SongSnapshot::revealed(&reveal.song),
            results: reveal.results.iter().map(Into::into).collect(),
            winner: reveal.winner.as_ref().map(PlayerSnapshot::from),
            state: RoomSnapshot::from(&*room),
        },
    );
    info!(
        code = %room.code(),
        round = room.round_number(),
        placements = reveal.results.len(),
        "round revealed"
    );

    state.events().publish(RoomEvent::RoundRevealed {
        code: room.code().to_string(),
        round: room.round_number(),
        song: reveal.song,
        results: reveal.results,
        winner_name: reveal.winner.map(|winner| winner.display_name),
    });
    Ok(())
}

async fn next_round(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    state
        .with_connection_room(connection_id, |room| {
            authorize_master(room, connection_id, "deal the next round")?;
            match room.deal_next_round()? {
                Some(_) => broadcast_room(
                    state,
                    room,
                    ServerMessage::RoundStarted {
                        state: RoomSnapshot::from(&*room),
                    },
                ),
                None => announce_finish(state, room),
            }
            Ok(())
        })
        .await
}

async fn end_game(state: &AppState, connection_id: ConnectionId) -> Result<(), ServiceError> {
    state
        .with_connection_room(connection_id, |room| {
            authorize_master(room, connection_id, "end the game")?;
            room.finish_game()?;
            announce_finish(state, room);
            Ok(())
        })
        .await
}

fn announce_finish(state: &AppState, room: &Room) {
    let winner = room.winner().map(PlayerSnapshot::from);
    info!(
        code = %room.code(),
        winner = winner.as_ref().map(|w| w.display_name.as_str()),
        "game finished"
    );
    broadcast_room(
        state,
        room,
        ServerMessage::GameFinished {
            winner,
            state: RoomSnapshot::from(room),
        },
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            collaborator::CollaboratorResult,
            models::ProfileEntity,
            music::{SongCandidate, SuggestionService, Suggestions},
            profile_store::memory::InMemoryProfileStore,
        },
        dto::ws::{FreeTextPreferences, PreResolvedPreferences, SongInput},
        state::{ClientConnection, Collaborators, SharedState},
    };

    struct FixedSuggestions(Vec<SongCandidate>);

    impl SuggestionService for FixedSuggestions {
        fn suggest(&self, _query: String) -> BoxFuture<'static, CollaboratorResult<Suggestions>> {
            let candidates = self.0.clone();
            Box::pin(async move {
                Ok(Suggestions {
                    candidates,
                    start_year_range: Some(YearRange {
                        min: 1975,
                        max: 1975,
                    }),
                    label: Some("Seventies".into()),
                })
            })
        }
    }

    struct BrokenSuggestions;

    impl SuggestionService for BrokenSuggestions {
        fn suggest(&self, _query: String) -> BoxFuture<'static, CollaboratorResult<Suggestions>> {
            Box::pin(async {
                Err(CollaboratorError::Status {
                    service: "suggestion service",
                    status: 503,
                })
            })
        }
    }

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl Client {
        /// Messages received since the last call.
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages
        }

        /// `type` tags of the messages received since the last call.
        fn types(&mut self) -> Vec<String> {
            self.drain()
                .iter()
                .map(|message| {
                    serde_json::to_value(message).unwrap()["type"]
                        .as_str()
                        .unwrap()
                        .to_string()
                })
                .collect()
        }
    }

    fn app(collaborators: Collaborators) -> SharedState {
        AppState::new(AppConfig::default(), collaborators)
    }

    fn connect(state: &AppState) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state
            .connections()
            .insert(id, ClientConnection { id, tx });
        Client { id, rx }
    }

    async fn send(state: &AppState, client: &Client, message: ClientMessage) {
        handle_message(state, client.id, message).await;
    }

    /// Create a room and return the master together with code and identity.
    async fn open_room(state: &AppState) -> (Client, String, String) {
        let mut master = connect(state);
        send(state, &master, ClientMessage::CreateRoom).await;
        match master.drain().pop() {
            Some(ServerMessage::RoomCreated {
                code,
                master_identity,
                ..
            }) => (master, code, master_identity),
            other => panic!("expected roomCreated, got {other:?}"),
        }
    }

    async fn join(state: &AppState, code: &str, name: &str) -> Client {
        let mut client = connect(state);
        send(
            state,
            &client,
            ClientMessage::JoinRoom(JoinRoomRequest {
                code: code.into(),
                display_name: name.into(),
                persistent_id: Some(format!("pid-{name}")),
                profile_ref: None,
            }),
        )
        .await;
        assert_eq!(client.types(), vec!["joined"]);
        client
    }

    fn songs(years: &[i32]) -> PreferencesInput {
        PreferencesInput::PreResolved(PreResolvedPreferences {
            songs: years
                .iter()
                .map(|year| SongInput {
                    id: Some(format!("song-{year}")),
                    title: format!("Hit {year}"),
                    artist: "Band".into(),
                    year: *year,
                    cover_url: None,
                    preview_url: None,
                })
                .collect(),
            start_year_range: Some(YearRange {
                min: 1970,
                max: 1970,
            }),
            label: None,
        })
    }

    fn commit(years: &[i32]) -> ClientMessage {
        ClientMessage::CommitPreferences {
            preferences: songs(years),
        }
    }

    /// Public id of the seat joined as `name`.
    async fn public_id(state: &AppState, code: &str, name: &str) -> Uuid {
        let room = state.registry().lookup(code).unwrap();
        let room = room.lock().await;
        room.player(&format!("pid-{name}")).unwrap().public_id
    }

    fn error_kind(messages: &[ServerMessage]) -> Option<ErrorKind> {
        messages.iter().find_map(|message| match message {
            ServerMessage::Error { kind, .. } => Some(*kind),
            _ => None,
        })
    }

    #[tokio::test]
    async fn full_round_reaches_everyone() {
        let state = app(Collaborators::offline());
        let mut events = state.events().subscribe();
        let (mut master, code, _) = open_room(&state).await;
        let mut alice = join(&state, &code.to_lowercase(), "alice").await;
        let mut bob = join(&state, &code, "bob").await;
        assert_eq!(master.types(), vec!["stateUpdate", "stateUpdate"]);
        assert_eq!(alice.types(), vec!["stateUpdate"]);

        send(&state, &master, commit(&[1980])).await;
        send(&state, &master, ClientMessage::StartGame).await;
        assert_eq!(bob.types(), vec!["preferencesCommitted", "gameStarted"]);

        send(&state, &alice, ClientMessage::PlaceCard { position: 1 }).await;
        send(&state, &bob, ClientMessage::PlaceCard { position: 0 }).await;

        let messages = master.drain();
        let revealed = messages.iter().find_map(|message| match message {
            ServerMessage::RoundRevealed { results, song, .. } => {
                Some((results.clone(), song.clone()))
            }
            _ => None,
        });
        let (results, song) = revealed.expect("round revealed to master");
        let alice_id = public_id(&state, &code, "alice").await;
        let bob_id = public_id(&state, &code, "bob").await;
        assert_eq!(song.year, Some(1980));
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.player_id == alice_id && r.correct));
        assert!(results.iter().any(|r| r.player_id == bob_id && !r.correct));
        assert!(alice.types().contains(&"roundRevealed".to_string()));

        let RoomEvent::RoundRevealed {
            code: event_code,
            round,
            ..
        } = events.try_recv().unwrap();
        assert_eq!(event_code, code);
        assert_eq!(round, 1);

        send(&state, &master, ClientMessage::NextRound).await;
        let finished = master.drain().into_iter().find_map(|message| match message {
            ServerMessage::GameFinished { winner, .. } => Some(winner),
            _ => None,
        });
        assert_eq!(finished.unwrap().unwrap().id, alice_id);
    }

    #[tokio::test]
    async fn master_only_actions_are_refused_to_players() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;
        let mut alice = join(&state, &code, "alice").await;
        master.drain();

        for action in [
            ClientMessage::StartGame,
            ClientMessage::ForceReveal,
            ClientMessage::NextRound,
            ClientMessage::EndGame,
            commit(&[1990]),
        ] {
            send(&state, &alice, action).await;
            assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::Unauthorized));
        }
        assert!(master.drain().is_empty());
    }

    #[tokio::test]
    async fn unknown_room_and_double_join_are_rejected() {
        let state = app(Collaborators::offline());
        let mut stranger = connect(&state);
        send(
            &state,
            &stranger,
            ClientMessage::JoinRoom(JoinRoomRequest {
                code: "NOPE22".into(),
                display_name: "x".into(),
                persistent_id: None,
                profile_ref: None,
            }),
        )
        .await;
        assert_eq!(error_kind(&stranger.drain()), Some(ErrorKind::NotFound));

        let (_master, code, _) = open_room(&state).await;
        let mut alice = join(&state, &code, "alice").await;
        let mut imposter = connect(&state);
        send(
            &state,
            &imposter,
            ClientMessage::JoinRoom(JoinRoomRequest {
                code: code.clone(),
                display_name: "alice again".into(),
                persistent_id: Some("pid-alice".into()),
                profile_ref: None,
            }),
        )
        .await;
        assert_eq!(error_kind(&imposter.drain()), Some(ErrorKind::Validation));

        send(&state, &alice, ClientMessage::CreateRoom).await;
        assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn profile_is_copied_at_join() {
        let profiles = InMemoryProfileStore::new();
        let now = std::time::SystemTime::now();
        profiles.insert(ProfileEntity {
            id: "prof-1".into(),
            display_name: "Ziggy".into(),
            avatar_color: "#ff00aa".into(),
            artist_name: Some("Ziggy Stardust".into()),
            music_style: Some("Glam".into()),
            profile_image: None,
            created_at: now,
            last_used_at: now,
        });
        let state = app(Collaborators {
            profiles: Arc::new(profiles),
            ..Collaborators::offline()
        });
        let (_master, code, _) = open_room(&state).await;

        let mut client = connect(&state);
        send(
            &state,
            &client,
            ClientMessage::JoinRoom(JoinRoomRequest {
                code,
                display_name: "Ziggy".into(),
                persistent_id: None,
                profile_ref: Some("prof-1".into()),
            }),
        )
        .await;
        let Some(ServerMessage::Joined { player, .. }) = client.drain().pop() else {
            panic!("expected joined");
        };
        assert_eq!(player.avatar_color.as_deref(), Some("#ff00aa"));
        assert_eq!(player.artist_name.as_deref(), Some("Ziggy Stardust"));
    }

    #[tokio::test]
    async fn free_text_resolves_through_collaborators() {
        let suggestions = FixedSuggestions(vec![
            SongCandidate {
                title: "Dated".into(),
                artist: "A".into(),
                year: Some(1977),
            },
            SongCandidate {
                title: "Undated".into(),
                artist: "B".into(),
                year: None,
            },
        ]);
        let state = app(Collaborators {
            suggestions: Arc::new(suggestions),
            ..Collaborators::offline()
        });
        let (mut master, code, _) = open_room(&state).await;

        send(
            &state,
            &master,
            ClientMessage::CommitPreferences {
                preferences: PreferencesInput::FreeText(FreeTextPreferences {
                    query: "glam rock".into(),
                }),
            },
        )
        .await;

        let committed = master.drain().into_iter().find_map(|message| match message {
            ServerMessage::PreferencesCommitted {
                songs,
                label,
                state,
            } => Some((songs, label, state)),
            _ => None,
        });
        let (count, label, snapshot) = committed.expect("preferences committed");
        assert_eq!(count, 1);
        assert_eq!(label.as_deref(), Some("Seventies"));
        let range = YearRange {
            min: 1975,
            max: 1975,
        };
        assert_eq!(snapshot.start_year_range, Some(range));

        let room = state.registry().lookup(&code).unwrap();
        assert_eq!(room.lock().await.phase(), RoomPhase::Lobby);
    }

    #[tokio::test]
    async fn collaborator_failure_leaves_room_in_setup() {
        let state = app(Collaborators {
            suggestions: Arc::new(BrokenSuggestions),
            ..Collaborators::offline()
        });
        let (mut master, code, _) = open_room(&state).await;

        let free_text = || ClientMessage::CommitPreferences {
            preferences: PreferencesInput::FreeText(FreeTextPreferences {
                query: "anything".into(),
            }),
        };
        send(&state, &master, free_text()).await;
        assert_eq!(error_kind(&master.drain()), Some(ErrorKind::CollaboratorFailure));

        let room = state.registry().lookup(&code).unwrap();
        {
            let room = room.lock().await;
            assert_eq!(room.phase(), RoomPhase::Setup);
            assert!(!room.commit_pending());
        }

        send(&state, &master, commit(&[1990])).await;
        assert!(error_kind(&master.drain()).is_none());
        assert_eq!(room.lock().await.phase(), RoomPhase::Lobby);
    }

    #[tokio::test]
    async fn disconnect_completing_quorum_reveals() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;
        let alice = join(&state, &code, "alice").await;
        let bob = join(&state, &code, "bob").await;
        send(&state, &master, commit(&[1980])).await;
        send(&state, &master, ClientMessage::StartGame).await;

        send(&state, &alice, ClientMessage::PlaceCard { position: 1 }).await;
        master.drain();
        handle_disconnect(&state, bob.id).await;

        let types = master.types();
        assert!(types.contains(&"playerDisconnected".to_string()));
        assert!(types.contains(&"roundRevealed".to_string()));
    }

    #[tokio::test]
    async fn player_reconnect_restores_seat() {
        let state = app(Collaborators::offline());
        let (master, code, _) = open_room(&state).await;
        let alice = join(&state, &code, "alice").await;
        send(&state, &master, commit(&[1980, 1990])).await;
        send(&state, &master, ClientMessage::StartGame).await;
        send(&state, &alice, ClientMessage::PlaceCard { position: 1 }).await;
        handle_disconnect(&state, alice.id).await;

        let mut again = connect(&state);
        send(
            &state,
            &again,
            ClientMessage::ReconnectPlayer(ReconnectPlayerRequest {
                code: code.clone(),
                persistent_id: "pid-alice".into(),
            }),
        )
        .await;
        let Some(ServerMessage::Reconnected {
            role,
            player,
            persistent_id,
            ..
        }) = again.drain().pop()
        else {
            panic!("expected reconnected");
        };
        assert_eq!(role, ConnectionRole::Player);
        assert_eq!(persistent_id.as_deref(), Some("pid-alice"));
        let player = player.unwrap();
        assert_eq!(player.score, 1);
        assert!(player.connected);

        let mut ghost = connect(&state);
        send(
            &state,
            &ghost,
            ClientMessage::ReconnectPlayer(ReconnectPlayerRequest {
                code,
                persistent_id: "pid-nobody".into(),
            }),
        )
        .await;
        assert_eq!(error_kind(&ghost.drain()), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn master_reconnect_requires_identity() {
        let state = app(Collaborators::offline());
        let (master, code, identity) = open_room(&state).await;
        let mut alice = join(&state, &code, "alice").await;

        handle_disconnect(&state, master.id).await;
        assert!(alice.types().contains(&"masterDisconnected".to_string()));

        let mut thief = connect(&state);
        send(
            &state,
            &thief,
            ClientMessage::ReconnectMaster(ReconnectMasterRequest {
                code: code.clone(),
                master_identity: "guess".into(),
            }),
        )
        .await;
        assert_eq!(error_kind(&thief.drain()), Some(ErrorKind::Unauthorized));

        let mut back = connect(&state);
        send(
            &state,
            &back,
            ClientMessage::ReconnectMaster(ReconnectMasterRequest {
                code,
                master_identity: identity,
            }),
        )
        .await;
        assert!(matches!(
            back.drain().pop(),
            Some(ServerMessage::Reconnected {
                role: ConnectionRole::Master,
                ..
            })
        ));
        send(&state, &back, commit(&[2000])).await;
        assert!(error_kind(&back.drain()).is_none());
    }

    #[tokio::test]
    async fn leaving_the_lobby_removes_the_player() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;
        let mut alice = join(&state, &code, "alice").await;
        master.drain();

        send(&state, &alice, ClientMessage::LeaveRoom).await;
        assert!(master.types().contains(&"playerDisconnected".to_string()));
        let room = state.registry().lookup(&code).unwrap();
        assert_eq!(room.lock().await.players().count(), 0);

        send(&state, &alice, ClientMessage::PlaceCard { position: 0 }).await;
        assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn persistent_ids_are_only_sent_to_their_owner() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;

        let mut alice = connect(&state);
        send(
            &state,
            &alice,
            ClientMessage::JoinRoom(JoinRoomRequest {
                code: code.clone(),
                display_name: "alice".into(),
                persistent_id: Some("pid-alice".into()),
                profile_ref: None,
            }),
        )
        .await;
        let Some(ServerMessage::Joined { persistent_id, .. }) = alice.drain().pop() else {
            panic!("expected joined");
        };
        assert_eq!(persistent_id, "pid-alice");

        let mut bob = join(&state, &code, "bob").await;
        send(&state, &master, commit(&[1980])).await;
        send(&state, &master, ClientMessage::StartGame).await;
        send(&state, &alice, ClientMessage::PlaceCard { position: 1 }).await;
        send(&state, &bob, ClientMessage::PlaceCard { position: 0 }).await;
        send(&state, &master, ClientMessage::NextRound).await;
        handle_disconnect(&state, alice.id).await;

        let seen: Vec<String> = master
            .drain()
            .into_iter()
            .chain(bob.drain())
            .map(|message| serde_json::to_string(&message).unwrap())
            .collect();
        assert!(seen.iter().any(|json| json.contains("gameFinished")));
        assert!(seen.iter().all(|json| !json.contains("pid-alice")));

        let alice_id = public_id(&state, &code, "alice").await;
        let mut thief = connect(&state);
        send(
            &state,
            &thief,
            ClientMessage::ReconnectPlayer(ReconnectPlayerRequest {
                code,
                persistent_id: alice_id.to_string(),
            }),
        )
        .await;
        assert_eq!(error_kind(&thief.drain()), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn setup_joiners_start_inside_the_committed_range() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;
        join(&state, &code, "alice").await;
        join(&state, &code, "bob").await;
        master.drain();

        send(&state, &master, commit(&[1990])).await;
        let snapshot = master.drain().into_iter().find_map(|message| match message {
            ServerMessage::PreferencesCommitted { state, .. } => Some(state),
            _ => None,
        });
        let snapshot = snapshot.expect("preferences committed");
        assert_eq!(snapshot.players.len(), 2);
        assert!(snapshot.players.iter().all(|player| player.start_year == 1970));
    }

    #[tokio::test]
    async fn late_joiner_has_no_result_on_forced_reveal() {
        let state = app(Collaborators::offline());
        let (mut master, code, _) = open_room(&state).await;
        let alice = join(&state, &code, "alice").await;
        let _bob = join(&state, &code, "bob").await;
        send(&state, &master, commit(&[1980, 1990])).await;
        send(&state, &master, ClientMessage::StartGame).await;
        send(&state, &alice, ClientMessage::PlaceCard { position: 1 }).await;

        let mut late = join(&state, &code, "late").await;
        assert!(!master.types().contains(&"roundRevealed".to_string()));
        send(&state, &late, ClientMessage::PlaceCard { position: 0 }).await;
        assert_eq!(error_kind(&late.drain()), Some(ErrorKind::Validation));

        send(&state, &master, ClientMessage::ForceReveal).await;
        let results = master.drain().into_iter().find_map(|message| match message {
            ServerMessage::RoundRevealed { results, .. } => Some(results),
            _ => None,
        });
        let results = results.expect("round revealed");
        let alice_id = public_id(&state, &code, "alice").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].player_id, alice_id);
    }
}
