use crate::{
    dto::room::RoomSnapshot,
    error::ServiceError,
    state::AppState,
};

/// Read-only snapshot of a live room, used by spectators and late joiners.
pub async fn room_snapshot(state: &AppState, code: &str) -> Result<RoomSnapshot, ServiceError> {
    let room = state
        .registry()
        .lookup(code)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))?;
    let room = room.lock().await;
    Ok(RoomSnapshot::from(&*room))
}
