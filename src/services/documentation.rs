use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Hitline Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::get_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::PlayerSnapshot,
            crate::dto::room::SongSnapshot,
            crate::dto::room::RoundResultDto,
            crate::dto::room::VisiblePhase,
            crate::dto::room::VisibleLifecycle,
            crate::dto::ws::ConnectionRole,
            crate::dto::ws::RoomClosedReason,
            crate::state::game::YearRange,
            crate::error::ErrorKind,
            crate::dao::music::CommentaryAudio,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Room state and the game websocket"),
    )
)]
/// OpenAPI document of the REST routes and the websocket schemas.
pub struct ApiDoc;
