//! Hitline Back binary entrypoint wiring the game websocket, REST routes and collaborators.

use std::{env, net::SocketAddr};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hitline_back::{
    build_app,
    config::AppConfig,
    services::{commentary_listener, room_sweeper},
    state::{AppState, Collaborators},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let collaborators = build_collaborators(&config).await;
    let app_state = AppState::new(config, collaborators);

    room_sweeper::spawn(app_state.clone());
    commentary_listener::spawn(app_state.clone());

    let app = build_app(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start from offline backends and swap in whatever is configured.
async fn build_collaborators(config: &AppConfig) -> Collaborators {
    #[allow(unused_mut)]
    let mut collaborators = Collaborators::offline();

    #[cfg(feature = "http-services")]
    http::install(&mut collaborators, &config.services);
    #[cfg(not(feature = "http-services"))]
    let _ = config;

    #[cfg(feature = "couch-store")]
    if let Some(store) = couch::connect_with_retry().await {
        collaborators.profiles = std::sync::Arc::new(store);
    }

    collaborators
}

#[cfg(feature = "http-services")]
mod http {
    use std::sync::Arc;

    use tracing::{info, warn};

    use hitline_back::{
        config::ServicesConfig,
        dao::music::http::{HttpCatalogResolver, HttpCommentaryService, HttpSuggestionService},
        state::Collaborators,
    };

    pub fn install(collaborators: &mut Collaborators, services: &ServicesConfig) {
        if let Some(url) = services.suggestion_url.as_deref() {
            match HttpSuggestionService::new(url, services.request_timeout) {
                Ok(service) => {
                    info!(url, "using remote suggestion service");
                    collaborators.suggestions = Arc::new(service);
                }
                Err(err) => warn!(url, error = %err, "suggestion service disabled"),
            }
        }
        if let Some(url) = services.catalog_url.as_deref() {
            match HttpCatalogResolver::new(url, services.request_timeout) {
                Ok(service) => {
                    info!(url, "using remote catalog");
                    collaborators.catalog = Arc::new(service);
                }
                Err(err) => warn!(url, error = %err, "remote catalog disabled"),
            }
        }
        if let Some(url) = services.commentary_url.as_deref() {
            match HttpCommentaryService::new(url, services.commentary_timeout) {
                Ok(service) => {
                    info!(url, "using remote commentary service");
                    collaborators.commentary = Arc::new(service);
                }
                Err(err) => warn!(url, error = %err, "commentary disabled"),
            }
        }
    }
}

#[cfg(feature = "couch-store")]
mod couch {
    use std::time::Duration;

    use tokio::time::sleep;
    use tracing::{info, warn};

    use hitline_back::dao::profile_store::couchdb::{CouchConfig, CouchDaoError, CouchProfileStore};

    const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
    const MAX_DELAY: Duration = Duration::from_secs(10);
    const MAX_ATTEMPTS: u32 = 5;

    /// Connect to the profile database, backing off between attempts.
    ///
    /// Returns `None` when CouchDB is not configured or never answers.
    pub async fn connect_with_retry() -> Option<CouchProfileStore> {
        let config = match CouchConfig::from_env() {
            Ok(config) => config,
            Err(CouchDaoError::MissingEnvVar { var }) => {
                info!(var, "no profile database configured; using in-memory profiles");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "invalid profile database configuration");
                return None;
            }
        };

        let mut delay = INITIAL_DELAY;
        for attempt in 1..=MAX_ATTEMPTS {
            match CouchProfileStore::connect(config.clone()).await {
                Ok(store) => {
                    info!(database = %config.database, "connected to CouchDB profile store");
                    return Some(store);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "CouchDB connection attempt failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
            }
        }

        warn!("giving up on CouchDB; profiles stay in memory");
        None
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
