//! Process-local profile store, used when no database is configured and in tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    collaborator::CollaboratorResult, models::ProfileEntity, profile_store::ProfileStore,
};

/// Profiles kept in a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<DashMap<String, ProfileEntity>>,
}

impl InMemoryProfileStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile.
    pub fn insert(&self, profile: ProfileEntity) {
        self.profiles.insert(profile.id.clone(), profile);
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn find_profile(
        &self,
        id: String,
    ) -> BoxFuture<'static, CollaboratorResult<Option<ProfileEntity>>> {
        let profile = self.profiles.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(profile) })
    }

    fn touch(&self, id: String) -> BoxFuture<'static, CollaboratorResult<()>> {
        if let Some(mut profile) = self.profiles.get_mut(&id) {
            profile.last_used_at = SystemTime::now();
        }
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, CollaboratorResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn touch_refreshes_last_used() {
        let store = InMemoryProfileStore::new();
        let long_ago = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        store.insert(ProfileEntity {
            id: "p1".into(),
            display_name: "Ziggy".into(),
            avatar_color: "#ff00aa".into(),
            artist_name: None,
            music_style: None,
            profile_image: None,
            created_at: long_ago,
            last_used_at: long_ago,
        });

        store.touch("p1".into()).await.unwrap();
        let profile = store.find_profile("p1".into()).await.unwrap().unwrap();
        assert!(profile.last_used_at > long_ago);
        assert!(store.find_profile("p2".into()).await.unwrap().is_none());
    }
}
