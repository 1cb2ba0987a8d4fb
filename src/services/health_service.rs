use tokio::time::timeout;
use tracing::warn;

use crate::{dto::health::HealthResponse, state::AppState};

/// Report liveness, degrading when the profile store does not answer.
pub async fn health_status(state: &AppState) -> HealthResponse {
    let rooms = state.registry().len();
    let limit = state.config().services.request_timeout;

    match timeout(limit, state.collaborators().profiles.health_check()).await {
        Ok(Ok(())) => HealthResponse::ok(rooms),
        Ok(Err(err)) => {
            warn!(error = %err, "profile store health check failed");
            HealthResponse::degraded(rooms)
        }
        Err(_) => {
            warn!("profile store health check timed out");
            HealthResponse::degraded(rooms)
        }
    }
}
