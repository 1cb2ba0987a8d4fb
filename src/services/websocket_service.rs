use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::session_broker,
    state::{ClientConnection, SharedState},
};

/// Handle the full lifecycle of one master or player websocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection_id = Uuid::new_v4();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        let mut outbound = UnboundedReceiverStream::new(outbound_rx);
        while let Some(message) = outbound.next().await {
            let Some(payload) = encode(&message) else {
                continue;
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    state.connections().insert(
        connection_id,
        ClientConnection {
            id: connection_id,
            tx: outbound_tx.clone(),
        },
    );
    info!(connection_id = %connection_id, "client connected");

    read_frames(&state, connection_id, receiver).await;

    session_broker::handle_disconnect(&state, connection_id).await;
    state.connections().remove(&connection_id);
    info!(connection_id = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch inbound frames in order until the client goes away.
async fn read_frames(
    state: &SharedState,
    connection_id: Uuid,
    mut receiver: futures::stream::SplitStream<WebSocket>,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!(connection_id = %connection_id, payload = %text, "received client message");
                match ClientMessage::from_json_str(&text) {
                    Ok(message) => {
                        session_broker::handle_message(state, connection_id, message).await
                    }
                    Err(err) => session_broker::reject(state, connection_id, "parse", &err),
                }
            }
            Ok(Message::Binary(_)) => {
                let err = ServiceError::InvalidInput("binary frames are not supported".into());
                session_broker::reject(state, connection_id, "parse", &err);
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "client closed");
                break;
            }
            // Pongs are queued by the protocol layer itself.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }
}

/// Serialize a server message, logging and skipping it on failure.
fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<ServerMessage>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
