use futures::future::BoxFuture;

use crate::dao::{collaborator::CollaboratorResult, models::ProfileEntity};

#[cfg(feature = "couch-store")]
/// Profile store backed by CouchDB.
pub mod couchdb;
pub mod memory;

/// Read access to player profiles kept outside the game server.
pub trait ProfileStore: Send + Sync {
    /// Profile stored under `id`, `None` when there is none.
    fn find_profile(
        &self,
        id: String,
    ) -> BoxFuture<'static, CollaboratorResult<Option<ProfileEntity>>>;
    /// Refresh the last-used timestamp of a profile.
    fn touch(&self, id: String) -> BoxFuture<'static, CollaboratorResult<()>>;
    /// Whether the store answers.
    fn health_check(&self) -> BoxFuture<'static, CollaboratorResult<()>>;
}
