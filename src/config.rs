//! Application-level configuration loading: gameplay rules and collaborator endpoints.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::game::YearRange;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HITLINE_BACK_CONFIG_PATH";

/// Score a player must reach to win the game.
pub const DEFAULT_WIN_SCORE: u32 = 10;
/// How long a room tolerates the absence of its master.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10 * 60);
/// Interval between two expiry sweeps of the room registry.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Range used to draw start years when the master did not provide one.
pub const DEFAULT_YEAR_RANGE: YearRange = YearRange {
    min: 1950,
    max: 2020,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Gameplay and room lifecycle rules.
    pub rules: GameRules,
    /// Endpoints and timeouts of the external collaborators.
    pub services: ServicesConfig,
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Rules applied to every room created by this process.
pub struct GameRules {
    /// Score that ends the game as soon as a player reaches it.
    pub win_score: u32,
    /// Maximum time a room waits for its master before being abandoned.
    #[serde(rename = "grace_period_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub grace_period: Duration,
    /// Interval of the background expiry sweep.
    #[serde(rename = "sweep_interval_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sweep_interval: Duration,
    /// Start-year range used when the committed deck carries none.
    pub default_year_range: YearRange,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            win_score: DEFAULT_WIN_SCORE,
            grace_period: DEFAULT_GRACE_PERIOD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            default_year_range: DEFAULT_YEAR_RANGE,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Base URLs of the HTTP collaborators. A missing URL selects the offline fallback.
pub struct ServicesConfig {
    /// Suggestion service for free-text themes.
    pub suggestion_url: Option<String>,
    /// Catalog resolving candidates into playable tracks.
    pub catalog_url: Option<String>,
    /// Commentary synthesis.
    pub commentary_url: Option<String>,
    /// Timeout applied to suggestion and catalog calls.
    #[serde(rename = "request_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    /// Timeout applied to commentary synthesis, which is usually slower.
    #[serde(rename = "commentary_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub commentary_timeout: Duration,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            suggestion_url: None,
            catalog_url: None,
            commentary_url: None,
            request_timeout: Duration::from_secs(20),
            commentary_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    let config = config.sanitized();
                    info!(
                        path = %path.display(),
                        win_score = config.rules.win_score,
                        grace_period_secs = config.rules.grace_period.as_secs(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Replace values that would make the game unplayable with their defaults.
    fn sanitized(mut self) -> Self {
        if self.rules.win_score == 0 {
            warn!("win_score must be positive; using default");
            self.rules.win_score = DEFAULT_WIN_SCORE;
        }
        if self.rules.default_year_range.min > self.rules.default_year_range.max {
            warn!(
                min = self.rules.default_year_range.min,
                max = self.rules.default_year_range.max,
                "default_year_range is inverted; using default"
            );
            self.rules.default_year_range = DEFAULT_YEAR_RANGE;
        }
        if self.rules.sweep_interval.is_zero() {
            self.rules.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
