use tracing::{debug, warn};

use crate::{
    dto::{
        room::RoomSnapshot,
        ws::{RoomClosedReason, ServerMessage},
    },
    state::{AppState, game::ConnectionId, registry::ClosedRoom, room::Room},
};

/// Queue `message` for one connection.
///
/// Returns `false` when the connection is gone; its entry is dropped.
pub fn send_private(state: &AppState, connection_id: ConnectionId, message: ServerMessage) -> bool {
    let Some(tx) = state
        .connections()
        .get(&connection_id)
        .map(|connection| connection.tx.clone())
    else {
        debug!(connection_id = %connection_id, "no live connection; message dropped");
        return false;
    };

    if tx.send(message).is_err() {
        warn!(connection_id = %connection_id, "writer closed, removing connection");
        state.connections().remove(&connection_id);
        return false;
    }
    true
}

/// Send `message` to the master and every connected player of `room`.
pub fn broadcast_room(state: &AppState, room: &Room, message: ServerMessage) {
    for connection_id in room.connection_ids() {
        send_private(state, connection_id, message.clone());
    }
}

/// Like [`broadcast_room`], skipping `except`.
pub fn broadcast_room_except(
    state: &AppState,
    room: &Room,
    except: ConnectionId,
    message: ServerMessage,
) {
    for connection_id in room
        .connection_ids()
        .into_iter()
        .filter(|id| *id != except)
    {
        send_private(state, connection_id, message.clone());
    }
}

/// Push the current snapshot of `room` to all its members.
pub fn broadcast_state(state: &AppState, room: &Room) {
    broadcast_room(
        state,
        room,
        ServerMessage::StateUpdate {
            state: RoomSnapshot::from(room),
        },
    );
}

/// Tell the remaining members of an evicted room that it is gone.
pub fn notify_closed(state: &AppState, closed: &ClosedRoom) {
    let reason = RoomClosedReason::from(closed.reason);
    for connection_id in &closed.connections {
        send_private(
            state,
            *connection_id,
            ServerMessage::RoomClosed {
                code: closed.code.clone(),
                reason,
            },
        );
    }
}
