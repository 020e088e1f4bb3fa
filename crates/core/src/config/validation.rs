//! Configuration validation rules.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL with a host
    /// - `cache_name`, `sync_tag` or `user_agent` is empty
    /// - `api_path_marker` does not start and end with `/`
    /// - `shell_path` or `action_route` is not an absolute path
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is outside 100ms..=5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.cache_name.trim().is_empty() {
            return Err(invalid("cache_name", "must not be empty"));
        }
        if self.sync_tag.trim().is_empty() {
            return Err(invalid("sync_tag", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.api_path_marker.len() < 2 || !self.api_path_marker.starts_with('/') || !self.api_path_marker.ends_with('/')
        {
            return Err(invalid("api_path_marker", "must look like /segment/"));
        }
        if !self.shell_path.starts_with('/') {
            return Err(invalid("shell_path", "must start with /"));
        }
        if !self.action_route.starts_with('/') || self.action_route.ends_with('/') {
            return Err(invalid("action_route", "must start with / and have no trailing /"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if !self.action_route.starts_with(self.api_path_marker.trim_end_matches('/')) {
            tracing::warn!(
                action_route = %self.action_route,
                api_path_marker = %self.api_path_marker,
                "action_route is outside the data API; replayed actions will not be network-first"
            );
        }

        Ok(())
    }
}
