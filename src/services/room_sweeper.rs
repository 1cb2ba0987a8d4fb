//! Periodically evicts rooms whose master never came back, and finished rooms
//! everyone has left.

use std::time::Instant;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::info;

use crate::{
    services::room_events::notify_closed,
    state::{AppState, SharedState},
};

/// Start the sweep loop on a background task.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(run(state))
}

/// Sweep on every tick of the configured interval, forever.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().rules.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        sweep_once(&state, Instant::now()).await;
    }
}

/// Evict expired rooms and tell whoever is still connected. Returns the eviction count.
pub async fn sweep_once(state: &AppState, now: Instant) -> usize {
    let closed = state.registry().sweep_expired_at(now).await;
    for room in &closed {
        info!(code = %room.code, reason = ?room.reason, "room closed");
        notify_closed(state, room);
    }
    closed.len()
}
