use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::dao::{
    collaborator::CollaboratorResult, models::ProfileEntity, profile_store::ProfileStore,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchProfileDocument, profile_doc_id},
};

/// Profile store reading `profile::<id>` documents over the CouchDB HTTP API.
#[derive(Clone)]
pub struct CouchProfileStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchProfileStore {
    /// Build a client and check that the profile database is reachable.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ping().await?;
        Ok(store)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorized(self.client.request(method, url))
    }

    /// The profile database is owned by the profile service; never create it here.
    async fn ping(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::DatabaseStatus {
                database,
                status: response.status(),
            })
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }
}

impl ProfileStore for CouchProfileStore {
    fn find_profile(
        &self,
        id: String,
    ) -> BoxFuture<'static, CollaboratorResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchProfileDocument>(&profile_doc_id(&id))
                .await?;
            Ok(doc.map(CouchProfileDocument::into_entity))
        })
    }

    fn touch(&self, id: String) -> BoxFuture<'static, CollaboratorResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = profile_doc_id(&id);
            let Some(mut doc) = store.get_document::<CouchProfileDocument>(&doc_id).await? else {
                return Ok(());
            };
            doc.profile.last_used_at = SystemTime::now();
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, CollaboratorResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
