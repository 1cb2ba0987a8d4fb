/// Spoken commentary for revealed rounds.
pub mod commentary_listener;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Helpers pushing server messages to connections and rooms.
pub mod room_events;
/// Read-only room queries.
pub mod room_service;
/// Eviction of abandoned and emptied finished rooms.
pub mod room_sweeper;
/// Client action dispatch and room fan-out.
pub mod session_broker;
/// WebSocket connection and message handling service.
pub mod websocket_service;
