use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::collaborator::CollaboratorError,
    state::{registry::RegistryError, room::RoomError},
};

/// Closed set of failure categories reported to websocket clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Unknown room, player or binding.
    NotFound,
    /// Master-only action from someone else, or a wrong master identity.
    Unauthorized,
    /// Action not allowed in the current phase.
    IllegalTransition,
    /// An external service failed or timed out.
    CollaboratorFailure,
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation cannot be performed in the current phase.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),
    /// An external collaborator failed.
    #[error("collaborator failure")]
    Collaborator(#[source] CollaboratorError),
    /// A collaborator did not answer in time.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl ServiceError {
    /// Category sent to the client alongside the message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::IllegalTransition(_) => ErrorKind::IllegalTransition,
            ServiceError::Collaborator(_) | ServiceError::Timeout(_) => {
                ErrorKind::CollaboratorFailure
            }
        }
    }

    /// Message sent to the client. Collaborator internals stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ServiceError::Collaborator(err) => match err {
                CollaboratorError::Disabled(service) => format!("{service} is not available"),
                _ => "an external service failed; please try again".into(),
            },
            other => other.to_string(),
        }
    }
}

impl From<CollaboratorError> for ServiceError {
    fn from(err: CollaboratorError) -> Self {
        ServiceError::Collaborator(err)
    }
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        let message = err.to_string();
        match err {
            RoomError::UnknownPlayer(_) | RoomError::Closed => ServiceError::NotFound(message),
            RoomError::MasterIdentityMismatch | RoomError::NotAPlayer => {
                ServiceError::Unauthorized(message)
            }
            RoomError::IllegalTransition(_)
            | RoomError::WrongPhase { .. }
            | RoomError::CommitPending
            | RoomError::StaleCommit(_)
            | RoomError::GameOver => ServiceError::IllegalTransition(message),
            RoomError::AlreadyInGame
            | RoomError::NoPlayers
            | RoomError::EmptyDeck
            | RoomError::InvalidYearRange { .. }
            | RoomError::NoActiveRound
            | RoomError::AlreadyPlaced
            | RoomError::WaitingForNextRound
            | RoomError::InvalidPosition { .. } => ServiceError::InvalidInput(message),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownRoom(code) => {
                ServiceError::NotFound(format!("room `{code}` not found"))
            }
            RegistryError::Room(err) => err.into(),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::IllegalTransition(message) => AppError::Conflict(message),
            err @ (ServiceError::Collaborator(_) | ServiceError::Timeout(_)) => {
                AppError::ServiceUnavailable(err.client_message())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
