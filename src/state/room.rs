//! Authoritative state of one game session.
//!
//! [`Room`] owns the roster, the song deck, the round lifecycle and the master
//! liveness tracking. It performs no I/O: every operation is a synchronous
//! transition that either applies completely or leaves the room untouched.

use std::time::{Instant, SystemTime};

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::GameRules,
    state::{
        game::{
            ConnectionId, PendingPlacement, Player, PlayerProfile, RoundResult, Song, YearRange,
        },
        state_machine::{ApplyError, InvalidTransition, PhaseMachine, PlanError, PlanId, RoomPhase},
    },
};

/// Liveness of the room as seen from its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The master is connected (or has not left).
    Active,
    /// The master disconnected; the grace period is running.
    AwaitingMaster,
    /// A winner has been declared.
    Finished,
    /// The master never came back within the grace period.
    Abandoned,
}

/// Reasons a room operation can be refused. The room is unchanged whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Persistent id or profile already seated.
    #[error("a player with this identity is already in the game")]
    AlreadyInGame,
    /// Reconnect for an id the room never saw.
    #[error("no player with persistent id `{0}` in this room")]
    UnknownPlayer(String),
    /// Player action from a connection without a seat.
    #[error("this connection is not a player of the room")]
    NotAPlayer,
    /// Wrong master secret.
    #[error("master identity does not match this room")]
    MasterIdentityMismatch,
    /// Phase graph refused the move.
    #[error(transparent)]
    IllegalTransition(#[from] InvalidTransition),
    /// Operation not available in the current phase.
    #[error("cannot {action} during the {phase:?} phase")]
    WrongPhase {
        /// What was attempted.
        action: &'static str,
        /// Phase the room was in.
        phase: RoomPhase,
    },
    /// Another commit holds the Setup → Lobby reservation.
    #[error("song selection is already in progress")]
    CommitPending,
    /// The reservation was dropped while resolving.
    #[error("room changed while songs were being resolved: {0}")]
    StaleCommit(ApplyError),
    /// Start requested on an empty roster.
    #[error("the game needs at least one player")]
    NoPlayers,
    /// Commit without songs.
    #[error("the song deck is empty")]
    EmptyDeck,
    /// `min` greater than `max`.
    #[error("start year range {min}..={max} is inverted")]
    InvalidYearRange {
        /// Lower bound as sent.
        min: i32,
        /// Upper bound as sent.
        max: i32,
    },
    /// Placement or reveal without a current song.
    #[error("no song is in play")]
    NoActiveRound,
    /// Second placement in the same round.
    #[error("a card was already placed this round")]
    AlreadyPlaced,
    /// Late joiner trying to place the song they were not dealt.
    #[error("joined mid-round; wait for the next song")]
    WaitingForNextRound,
    /// Slot index past the end of the timeline.
    #[error("position {position} is outside the {slots} available slots")]
    InvalidPosition {
        /// Requested slot.
        position: usize,
        /// Number of valid slots.
        slots: usize,
    },
    /// The room already has a winner.
    #[error("the game is already over")]
    GameOver,
    /// The room was abandoned.
    #[error("the room is closed")]
    Closed,
}

impl From<PlanError> for RoomError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => RoomError::CommitPending,
            PlanError::InvalidTransition(invalid) => RoomError::IllegalTransition(invalid),
        }
    }
}

/// Everything produced by revealing a round.
#[derive(Debug, Clone)]
pub struct RoundReveal {
    /// Song that was in play.
    pub song: Song,
    /// One entry per player who had a pending placement.
    pub results: Vec<RoundResult>,
    /// Winner, once somebody reached the win score.
    pub winner: Option<Player>,
}

/// State machine for one game session.
#[derive(Debug)]
pub struct Room {
    code: String,
    master_connection_id: Option<ConnectionId>,
    master_identity: String,
    lifecycle: LifecycleState,
    last_master_activity: Instant,
    machine: PhaseMachine,
    players: IndexMap<String, Player>,
    song_deck: Vec<Song>,
    round_number: usize,
    current_song: Option<Song>,
    start_year_range: Option<YearRange>,
    deck_label: Option<String>,
    winner: Option<String>,
    rules: GameRules,
    created_at: SystemTime,
}

impl Room {
    /// Open a room in [`RoomPhase::Setup`] for the given master connection.
    ///
    /// The caller guarantees that `code` is unique.
    pub fn new(code: String, master: ConnectionId, rules: GameRules, now: Instant) -> Self {
        Self {
            code,
            master_connection_id: Some(master),
            master_identity: Uuid::new_v4().simple().to_string(),
            lifecycle: LifecycleState::Active,
            last_master_activity: now,
            machine: PhaseMachine::new(),
            players: IndexMap::new(),
            song_deck: Vec::new(),
            round_number: 0,
            current_song: None,
            start_year_range: None,
            deck_label: None,
            winner: None,
            rules,
            created_at: SystemTime::now(),
        }
    }

    /// Six-character join code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Secret handed to the master once, required to take the room back.
    pub fn master_identity(&self) -> &str {
        &self.master_identity
    }

    /// Connection currently acting as master, if any.
    pub fn master_connection_id(&self) -> Option<ConnectionId> {
        self.master_connection_id
    }

    /// Whether `connection_id` is the bound master.
    pub fn is_master(&self, connection_id: ConnectionId) -> bool {
        self.master_connection_id == Some(connection_id)
    }

    /// Current master liveness state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Current game phase.
    pub fn phase(&self) -> RoomPhase {
        self.machine.phase()
    }

    /// Whether a song commit is waiting on collaborators.
    pub fn commit_pending(&self) -> bool {
        self.machine.pending().is_some()
    }

    /// Rules the room was opened with.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Player seated under `persistent_id`.
    pub fn player(&self, persistent_id: &str) -> Option<&Player> {
        self.players.get(persistent_id)
    }

    /// Player bound to `connection_id`.
    pub fn player_by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players
            .values()
            .find(|player| player.connection_id == Some(connection_id))
    }

    fn player_by_connection_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Player> {
        self.players
            .values_mut()
            .find(|player| player.connection_id == Some(connection_id))
    }

    /// Songs not dealt yet, in draw order.
    pub fn song_deck(&self) -> &[Song] {
        &self.song_deck
    }

    /// Number of songs dealt so far.
    pub fn round_number(&self) -> usize {
        self.round_number
    }

    /// Song in play, year included.
    pub fn current_song(&self) -> Option<&Song> {
        self.current_song.as_ref()
    }

    /// Range committed by the master, if any.
    pub fn start_year_range(&self) -> Option<YearRange> {
        self.start_year_range
    }

    /// Human-readable deck description.
    pub fn deck_label(&self) -> Option<&str> {
        self.deck_label.as_deref()
    }

    /// Declared winner.
    pub fn winner(&self) -> Option<&Player> {
        self.winner.as_deref().and_then(|id| self.players.get(id))
    }

    /// Connections that should receive room broadcasts: the master and every
    /// connected player.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.master_connection_id
            .into_iter()
            .chain(self.players.values().filter_map(|player| player.connection_id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Add a player to the room and draw their start year.
    pub fn add_player(
        &mut self,
        connection_id: ConnectionId,
        display_name: String,
        persistent_id: Option<String>,
        profile_reference: Option<String>,
        profile: PlayerProfile,
    ) -> Result<&Player, RoomError> {
        if self.phase() == RoomPhase::Finished {
            return Err(RoomError::GameOver);
        }

        let persistent_id = persistent_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let duplicate = self.players.contains_key(&persistent_id)
            || profile_reference.as_ref().is_some_and(|reference| {
                self.players
                    .values()
                    .any(|player| player.profile_reference.as_ref() == Some(reference))
            });
        if duplicate {
            return Err(RoomError::AlreadyInGame);
        }

        let start_year = draw_year(self.start_year_range.unwrap_or(self.rules.default_year_range));

        let mut player = Player::new(
            connection_id,
            persistent_id.clone(),
            display_name,
            profile_reference,
            profile,
            start_year,
        );
        // Late joiners must not hold up a round they were not dealt.
        player.is_ready = self.phase() == RoomPhase::Playing;

        let (index, _) = self.players.insert_full(persistent_id, player);
        Ok(&self.players[index])
    }

    /// Drop a player entirely. Only used before the game has started.
    pub fn remove_player(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let index = self
            .players
            .values()
            .position(|player| player.connection_id == Some(connection_id))?;
        self.players
            .shift_remove_index(index)
            .map(|(_, player)| player)
    }

    /// Keep the player, their timeline and score, but flag them offline.
    pub fn mark_disconnected(&mut self, connection_id: ConnectionId) -> Option<&Player> {
        let player = self.player_by_connection_mut(connection_id)?;
        player.connected = false;
        player.connection_id = None;
        Some(player)
    }

    /// Rebind a known player to a new connection, preserving everything else.
    pub fn reconnect_player(
        &mut self,
        persistent_id: &str,
        connection_id: ConnectionId,
    ) -> Result<&Player, RoomError> {
        let player = self
            .players
            .get_mut(persistent_id)
            .ok_or_else(|| RoomError::UnknownPlayer(persistent_id.to_string()))?;
        player.connection_id = Some(connection_id);
        player.connected = true;
        Ok(player)
    }

    // -----------------------------------------------------------------------
    // Song selection
    // -----------------------------------------------------------------------

    /// Commit a resolved deck in one step.
    pub fn commit_songs(
        &mut self,
        songs: Vec<Song>,
        range: Option<YearRange>,
        label: Option<String>,
    ) -> Result<(), RoomError> {
        let plan_id = self.plan_commit()?;
        self.apply_commit(plan_id, songs, range, label)
    }

    /// Reserve the Setup → Lobby transition before resolving songs elsewhere.
    pub fn plan_commit(&mut self) -> Result<PlanId, RoomError> {
        if self.phase() != RoomPhase::Setup {
            return Err(RoomError::WrongPhase {
                action: "commit songs",
                phase: self.phase(),
            });
        }
        Ok(self.machine.plan(RoomPhase::Lobby)?.id)
    }

    /// Install the deck reserved by `plan_id`, shuffling it once.
    ///
    /// Invalid input aborts the plan and leaves the room in Setup.
    pub fn apply_commit(
        &mut self,
        plan_id: PlanId,
        mut songs: Vec<Song>,
        range: Option<YearRange>,
        label: Option<String>,
    ) -> Result<(), RoomError> {
        let invalid = if songs.is_empty() {
            Some(RoomError::EmptyDeck)
        } else {
            range
                .filter(|range| !range.is_valid())
                .map(|range| RoomError::InvalidYearRange {
                    min: range.min,
                    max: range.max,
                })
        };
        if let Some(err) = invalid {
            self.abort_commit(plan_id);
            return Err(err);
        }

        self.machine.apply(plan_id).map_err(RoomError::StaleCommit)?;

        songs.shuffle(&mut rand::rng());
        self.song_deck = songs;
        if let Some(range) = range {
            self.start_year_range = Some(range);
            // Players who joined during Setup drew from the default range.
            for player in self.players.values_mut() {
                if player.timeline.is_empty() {
                    player.start_year = draw_year(range);
                }
            }
        }
        self.deck_label = label;
        Ok(())
    }

    /// Release a reserved commit. Returns whether the plan was still pending.
    pub fn abort_commit(&mut self, plan_id: PlanId) -> bool {
        self.machine.abort(plan_id).is_ok()
    }

    /// Move along the phase graph without side effects on the round state.
    pub fn advance_phase(&mut self, target: RoomPhase) -> Result<RoomPhase, RoomError> {
        let next = self.machine.advance(target)?;
        if next == RoomPhase::Finished {
            self.lifecycle = LifecycleState::Finished;
        }
        Ok(next)
    }

    // -----------------------------------------------------------------------
    // Rounds
    // -----------------------------------------------------------------------

    /// Leave Setup/Lobby and deal the first song.
    pub fn start_game(&mut self) -> Result<Song, RoomError> {
        let phase = self.phase();
        if !matches!(phase, RoomPhase::Setup | RoomPhase::Lobby) {
            return Err(RoomError::WrongPhase {
                action: "start the game",
                phase,
            });
        }
        if self.commit_pending() {
            return Err(RoomError::CommitPending);
        }
        if self.players.is_empty() {
            return Err(RoomError::NoPlayers);
        }
        if self.song_deck.is_empty() {
            return Err(RoomError::EmptyDeck);
        }

        self.advance_phase(RoomPhase::Playing)?;
        self.deal().ok_or(RoomError::EmptyDeck)
    }

    /// Deal the next song from Reveal, or finish the game.
    ///
    /// Returns `None` when the game ended, either because somebody reached
    /// the win score or because the deck is exhausted.
    pub fn deal_next_round(&mut self) -> Result<Option<Song>, RoomError> {
        let phase = self.phase();
        if phase != RoomPhase::Reveal {
            return Err(InvalidTransition {
                from: phase,
                to: RoomPhase::Playing,
            }
            .into());
        }

        if let Some(winner) = self.check_winner().map(|player| player.persistent_id.clone()) {
            self.finish(Some(winner))?;
            return Ok(None);
        }

        if self.round_number >= self.song_deck.len() {
            let leader = self.leader().map(|player| player.persistent_id.clone());
            self.finish(leader)?;
            return Ok(None);
        }

        self.advance_phase(RoomPhase::Playing)?;
        Ok(self.deal())
    }

    /// End the game early and crown the current leader.
    pub fn finish_game(&mut self) -> Result<Option<&Player>, RoomError> {
        let winner = self
            .winner
            .clone()
            .or_else(|| self.leader().map(|player| player.persistent_id.clone()));
        self.finish(winner)?;
        Ok(self.winner())
    }

    fn finish(&mut self, winner: Option<String>) -> Result<(), RoomError> {
        self.advance_phase(RoomPhase::Finished)?;
        self.winner = winner;
        self.current_song = None;
        for player in self.players.values_mut() {
            player.pending_placement = None;
        }
        Ok(())
    }

    fn deal(&mut self) -> Option<Song> {
        let song = self.song_deck.get(self.round_number)?.clone();
        self.round_number += 1;
        self.current_song = Some(song.clone());
        for player in self.players.values_mut() {
            player.is_ready = false;
            player.pending_placement = None;
        }
        Some(song)
    }

    /// Tender a placement for the current song.
    pub fn submit_placement(
        &mut self,
        connection_id: ConnectionId,
        position: usize,
    ) -> Result<&Player, RoomError> {
        let phase = self.phase();
        if phase != RoomPhase::Playing {
            return Err(RoomError::WrongPhase {
                action: "place a card",
                phase,
            });
        }
        let song = self.current_song.clone().ok_or(RoomError::NoActiveRound)?;
        let player = self
            .player_by_connection_mut(connection_id)
            .ok_or(RoomError::NotAPlayer)?;

        if player.is_ready {
            return Err(if player.pending_placement.is_some() {
                RoomError::AlreadyPlaced
            } else {
                RoomError::WaitingForNextRound
            });
        }

        let slots = player.timeline.slot_count();
        if position >= slots {
            return Err(RoomError::InvalidPosition { position, slots });
        }

        player.pending_placement = Some(PendingPlacement { song, position });
        player.is_ready = true;
        Ok(player)
    }

    /// True iff at least one player is connected and all connected players
    /// have placed their card.
    pub fn all_ready(&self) -> bool {
        let mut connected = self
            .players
            .values()
            .filter(|player| player.connected)
            .peekable();
        connected.peek().is_some() && connected.all(|player| player.is_ready)
    }

    /// Score every pending placement and move to Reveal.
    ///
    /// Players without a pending placement produce no result.
    pub fn evaluate_round(&mut self) -> Result<Vec<RoundResult>, RoomError> {
        self.advance_phase(RoomPhase::Reveal)?;

        let round = self.round_number;
        let mut results = Vec::new();
        for player in self.players.values_mut() {
            let Some(PendingPlacement { song, position }) = player.pending_placement.take() else {
                continue;
            };
            let actual_year = song.year;
            let correct = player.timeline.try_place(player.start_year, position, song);
            if correct {
                player.score += 1;
                player.scored_in_round = Some(round);
            }
            results.push(RoundResult {
                player_id: player.public_id,
                player_name: player.display_name.clone(),
                correct,
                placed_position: position,
                actual_year,
            });
        }

        Ok(results)
    }

    /// Return the winner, committing one if a player reached the win score.
    pub fn check_winner(&mut self) -> Option<&Player> {
        if self.winner.is_none() {
            let win_score = self.rules.win_score;
            self.winner = best_player(
                self.players
                    .values()
                    .filter(|player| player.score >= win_score),
            )
            .map(|player| player.persistent_id.clone());
        }
        self.winner()
    }

    /// Evaluate the round and check for a winner without interleaving
    /// anything in between.
    pub fn reveal_round(&mut self) -> Result<RoundReveal, RoomError> {
        let song = self.current_song.clone().ok_or(RoomError::NoActiveRound)?;
        let results = self.evaluate_round()?;
        let winner = self.check_winner().cloned();
        Ok(RoundReveal {
            song,
            results,
            winner,
        })
    }

    /// Highest score; ties go to whoever reached it in the earlier round,
    /// then to join order.
    pub fn leader(&self) -> Option<&Player> {
        best_player(self.players.values())
    }

    // -----------------------------------------------------------------------
    // Master liveness
    // -----------------------------------------------------------------------

    /// Record activity from the master.
    pub fn touch_master(&mut self, now: Instant) {
        self.last_master_activity = now;
    }

    /// Start the grace period after the master connection dropped.
    pub fn mark_master_disconnected(&mut self, now: Instant) {
        self.master_connection_id = None;
        self.last_master_activity = now;
        if self.lifecycle == LifecycleState::Active {
            self.lifecycle = LifecycleState::AwaitingMaster;
        }
    }

    /// Hand master control to `connection_id` if `identity` matches.
    pub fn reconnect_master(
        &mut self,
        identity: &str,
        connection_id: ConnectionId,
        now: Instant,
    ) -> Result<(), RoomError> {
        if identity != self.master_identity {
            return Err(RoomError::MasterIdentityMismatch);
        }
        if matches!(
            self.lifecycle,
            LifecycleState::Abandoned | LifecycleState::Finished
        ) {
            return Err(RoomError::Closed);
        }

        self.master_connection_id = Some(connection_id);
        self.lifecycle = LifecycleState::Active;
        self.last_master_activity = now;
        Ok(())
    }

    /// Whether the room should be evicted by the registry sweep.
    pub fn is_expired(&self, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.last_master_activity);
        match self.lifecycle {
            LifecycleState::Active => false,
            LifecycleState::AwaitingMaster => idle > self.rules.grace_period,
            LifecycleState::Abandoned => true,
            LifecycleState::Finished => {
                self.master_connection_id.is_none()
                    && !self.players.values().any(|player| player.connected)
                    && idle > self.rules.grace_period
            }
        }
    }

    /// Flag a room whose master never returned.
    pub fn mark_abandoned(&mut self) {
        if self.lifecycle == LifecycleState::AwaitingMaster {
            self.lifecycle = LifecycleState::Abandoned;
        }
    }
}

fn draw_year(range: YearRange) -> i32 {
    rand::rng().random_range(range.min..=range.max)
}

fn best_player<'a>(players: impl Iterator<Item = &'a Player>) -> Option<&'a Player> {
    players.fold(None, |best: Option<&Player>, candidate| match best {
        Some(current)
            if current.score > candidate.score
                || (current.score == candidate.score
                    && current.scored_in_round <= candidate.scored_in_round) =>
        {
            Some(current)
        }
        _ => Some(candidate),
    })
}
