//! Error types of the CouchDB profile store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::collaborator::CollaboratorError;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required setting absent; profiles stay in memory.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Builder failure.
        #[source]
        source: reqwest::Error,
    },
    /// The profile database did not answer.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The profile database answered with an error status.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status received.
        status: StatusCode,
    },
    /// A document request could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path.
        path: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// A document request got an error status.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path.
        path: String,
        /// Status received.
        status: StatusCode,
    },
    /// A document body did not match the profile shape.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
}

impl From<CouchDaoError> for CollaboratorError {
    fn from(err: CouchDaoError) -> Self {
        CollaboratorError::unavailable("profile store", err.to_string(), err)
    }
}
