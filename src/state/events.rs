use tokio::sync::broadcast;

use crate::state::game::{RoundResult, Song};

/// In-process notifications about room activity, consumed by background listeners.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A round was evaluated and shown to the room.
    RoundRevealed {
        /// Room code.
        code: String,
        /// Round number at reveal time.
        round: usize,
        /// Song that was guessed.
        song: Song,
        /// Per-player outcomes.
        results: Vec<RoundResult>,
        /// Set when the reveal produced a winner.
        winner_name: Option<String>,
    },
}

/// Broadcast hub fanning [`RoomEvent`]s out to every subscriber.
pub struct RoomEventHub {
    sender: broadcast::Sender<RoomEvent>,
}

impl RoomEventHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, event: RoomEvent) {
        let _ = self.sender.send(event);
    }
}
