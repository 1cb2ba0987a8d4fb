//! Library crate for hitline-back, exposing modules for binaries and integration tests.

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
/// Collaborator seams: music services and the profile store.
pub mod dao;
/// Wire types for the websocket protocol and the REST routes.
pub mod dto;
/// Service-level errors and their client-facing categories.
pub mod error;
/// HTTP routing.
pub mod routes;
/// Request handling and background tasks.
pub mod services;
/// Shared application state and the room model.
pub mod state;

/// Build the top-level router and attach cross-cutting middleware layers.
pub fn build_app(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
