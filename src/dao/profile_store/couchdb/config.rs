use super::error::{CouchDaoError, CouchResult};

/// Database holding player profiles when `COUCH_DB` is not set.
pub const DEFAULT_PROFILE_DATABASE: &str = "profiles";

/// Where the profile documents live and how to authenticate against them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    /// Server root, without a trailing slash.
    pub base_url: String,
    /// Database holding one document per profile.
    pub database: String,
    /// Basic-auth user, set together with `password`.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Read the profile store settings from the process environment.
    ///
    /// Only `COUCH_BASE_URL` is required; without it the server keeps
    /// profiles in memory.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or(CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = lookup("COUCH_DB")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_DATABASE.to_string());

        // A lone username or password is ignored rather than half-applied.
        let (username, password) = match (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            (Some(username), Some(password)) => (Some(username), Some(password)),
            _ => (None, None),
        };

        Ok(Self {
            base_url,
            database,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&'static str, &str)]) -> CouchResult<CouchConfig> {
        let vars: HashMap<&str, String> = vars
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect();
        CouchConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn database_defaults_to_profiles() {
        let config = config(&[("COUCH_BASE_URL", "http://couch:5984/")]).unwrap();
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.database, DEFAULT_PROFILE_DATABASE);
        assert!(config.username.is_none());
    }

    #[test]
    fn credentials_need_both_halves() {
        let half = config(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_DB", "players"),
            ("COUCH_USERNAME", "admin"),
        ])
        .unwrap();
        assert_eq!(half.database, "players");
        assert!(half.username.is_none() && half.password.is_none());

        let full = config(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_USERNAME", "admin"),
            ("COUCH_PASSWORD", "secret"),
        ])
        .unwrap();
        assert_eq!(full.username.as_deref(), Some("admin"));
        assert_eq!(full.password.as_deref(), Some("secret"));
    }

    #[test]
    fn missing_base_url_means_no_store() {
        assert!(matches!(
            config(&[("COUCH_DB", "players")]),
            Err(CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL"
            })
        ));
        assert!(config(&[("COUCH_BASE_URL", "  ")]).is_err());
    }
}
