use std::error::Error;
use thiserror::Error;

/// Result alias for calls to external collaborators.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Error raised by collaborator backends regardless of the transport.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Transport-level failure.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed.
        service: &'static str,
        /// Short description of the failure.
        message: String,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend is not configured in this deployment.
    #[error("{0} is not configured")]
    Disabled(&'static str),
    /// Non-success HTTP status.
    #[error("{service} answered with status {status}")]
    Status {
        /// Which collaborator answered.
        service: &'static str,
        /// Status code received.
        status: u16,
    },
    /// The answer could not be used.
    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse {
        /// Which collaborator answered.
        service: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

impl CollaboratorError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        service: &'static str,
        message: String,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        CollaboratorError::Unavailable {
            service,
            message,
            source: Box::new(source),
        }
    }
}
