use axum::Router;

use crate::state::SharedState;

/// Swagger UI.
pub mod docs;
/// `GET /healthcheck`.
pub mod health;
/// `GET /rooms/{code}`.
pub mod rooms;
/// `GET /ws` upgrade.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
