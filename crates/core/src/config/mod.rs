//! Application configuration with layered loading.
//!
//! Uses figment to merge, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Environment variables (SWCACHE_*)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the application is served from; requests to any other origin
    /// are not intercepted.
    ///
    /// Set via SWCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Name of the active cache generation. Bump it on every deployment.
    ///
    /// Set via SWCACHE_CACHE_NAME environment variable.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Path to SQLite database holding the cache and the action queue.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Document seeded into a fresh generation at install time.
    #[serde(default = "default_shell_path")]
    pub shell_path: String,

    /// Path fragment marking the data API (network-first requests).
    #[serde(default = "default_api_path_marker")]
    pub api_path_marker: String,

    /// Base path of the replay endpoint, `{action_route}/{raffle_id}/{action_type}`.
    #[serde(default = "default_action_route")]
    pub action_route: String,

    /// Sync tag that triggers a drain of the action queue.
    ///
    /// Set via SWCACHE_SYNC_TAG environment variable.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Queue `POST`s to the replay endpoint that fail while offline.
    #[serde(default = "default_true")]
    pub queue_failed_mutations: bool,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SWCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_name() -> String {
    "raffleiq-admin-v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_shell_path() -> String {
    "/".into()
}

fn default_api_path_marker() -> String {
    "/api/".into()
}

fn default_action_route() -> String {
    "/api/admin/raffles".into()
}

fn default_sync_tag() -> String {
    "raffle-action".into()
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_name: default_cache_name(),
            db_path: default_db_path(),
            shell_path: default_shell_path(),
            api_path_marker: default_api_path_marker(),
            action_route: default_action_route(),
            sync_tag: default_sync_tag(),
            queue_failed_mutations: true,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The serving origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) URL with a host".into() });
        }
        Ok(url)
    }

    /// Absolute URL of the document seeded at install.
    pub fn shell_url(&self) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(&self.shell_path)
            .map_err(|e| ConfigError::Invalid { field: "shell_path".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed,
    /// or validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
