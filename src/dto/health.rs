use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of live rooms.
    pub rooms: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            rooms,
        }
    }

    /// Create a health response indicating a collaborator is unreachable.
    pub fn degraded(rooms: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            rooms,
        }
    }
}
