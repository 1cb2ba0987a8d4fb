use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use axum_valid::Valid;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::{
    dto::{room::RoomSnapshot, validation::validate_room_code},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Path parameters addressing a room.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct RoomCodeParams {
    /// Six-character room code, case-insensitive.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
}

/// Routes exposing read-only room state.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{code}", get(get_room))
}

/// Current snapshot of a room. Song years stay hidden while a round is open.
#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "game",
    params(RoomCodeParams),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 400, description = "Malformed room code"),
        (status = 404, description = "No such room")
    )
)]
/// Current snapshot of one room.
pub async fn get_room(
    State(state): State<SharedState>,
    Valid(Path(params)): Valid<Path<RoomCodeParams>>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::room_snapshot(&state, &params.code).await?;
    Ok(Json(snapshot))
}
