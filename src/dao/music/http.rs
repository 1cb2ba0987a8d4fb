//! JSON-over-HTTP collaborator backends.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    dao::{
        collaborator::{CollaboratorError, CollaboratorResult},
        music::{
            CatalogResolver, CatalogTrack, CommentaryAudio, CommentaryRequest, CommentaryService,
            SongCandidate, SuggestionService, Suggestions,
        },
    },
    state::game::Song,
};

const SUGGESTION_SERVICE: &str = "suggestion service";
const CATALOG_SERVICE: &str = "catalog";
const COMMENTARY_SERVICE: &str = "commentary service";

#[derive(Debug, Clone)]
struct JsonEndpoint {
    client: Client,
    base_url: Arc<str>,
    service: &'static str,
}

impl JsonEndpoint {
    fn new(service: &'static str, base_url: &str, timeout: Duration) -> CollaboratorResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|source| {
            CollaboratorError::unavailable(service, "failed to build HTTP client".into(), source)
        })?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            service,
        })
    }

    /// POST `body` to `path`. A 404 answer maps to `None`.
    async fn post<B, T>(&self, path: &str, body: &B) -> CollaboratorResult<Option<T>>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| {
                CollaboratorError::unavailable(self.service, format!("POST {url} failed"), source)
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CollaboratorError::InvalidResponse {
                        service: self.service,
                        message: source.to_string(),
                    }
                })
            }
            other => Err(CollaboratorError::Status {
                service: self.service,
                status: other.as_u16(),
            }),
        }
    }
}

/// Calls `POST {base}/suggestions` with `{ "query": ... }`.
#[derive(Debug, Clone)]
pub struct HttpSuggestionService {
    endpoint: JsonEndpoint,
}

impl HttpSuggestionService {
    /// Client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> CollaboratorResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(SUGGESTION_SERVICE, base_url, timeout)?,
        })
    }
}

#[derive(Serialize)]
struct SuggestionQuery {
    query: String,
}

impl SuggestionService for HttpSuggestionService {
    fn suggest(&self, query: String) -> BoxFuture<'static, CollaboratorResult<Suggestions>> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let suggestions = endpoint
                .post::<_, Suggestions>("suggestions", &SuggestionQuery { query })
                .await?
                .ok_or(CollaboratorError::Status {
                    service: SUGGESTION_SERVICE,
                    status: StatusCode::NOT_FOUND.as_u16(),
                })?;
            debug!(
                candidates = suggestions.candidates.len(),
                "received song suggestions"
            );
            Ok(suggestions)
        })
    }
}

/// Calls `POST {base}/resolve` with the candidate; 404 means no match.
#[derive(Debug, Clone)]
pub struct HttpCatalogResolver {
    endpoint: JsonEndpoint,
}

impl HttpCatalogResolver {
    /// Client for the catalog at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> CollaboratorResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(CATALOG_SERVICE, base_url, timeout)?,
        })
    }
}

impl CatalogResolver for HttpCatalogResolver {
    fn resolve(
        &self,
        candidate: SongCandidate,
    ) -> BoxFuture<'static, CollaboratorResult<Option<Song>>> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let track = endpoint
                .post::<_, CatalogTrack>("resolve", &candidate)
                .await?;
            Ok(track.map(Song::from))
        })
    }
}

/// Calls `POST {base}/commentary` with the round summary.
#[derive(Debug, Clone)]
pub struct HttpCommentaryService {
    endpoint: JsonEndpoint,
}

impl HttpCommentaryService {
    /// Client for the commentary service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> CollaboratorResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(COMMENTARY_SERVICE, base_url, timeout)?,
        })
    }
}

impl CommentaryService for HttpCommentaryService {
    fn narrate(
        &self,
        request: CommentaryRequest,
    ) -> BoxFuture<'static, CollaboratorResult<CommentaryAudio>> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let audio = endpoint
                .post::<_, CommentaryAudio>("commentary", &request)
                .await?
                .ok_or(CollaboratorError::Status {
                    service: COMMENTARY_SERVICE,
                    status: StatusCode::NOT_FOUND.as_u16(),
                })?;
            if audio.url.is_none() && audio.data_base64.is_none() {
                return Err(CollaboratorError::InvalidResponse {
                    service: COMMENTARY_SERVICE,
                    message: "audio carries neither url nor data".into(),
                });
            }
            Ok(audio)
        })
    }
}
