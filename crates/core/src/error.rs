//! Unified error types for swcache.
//!
//! `Display` output starts with a stable code so host frames and logs can be
//! matched without parsing free text.

use tokio_rusqlite::rusqlite;

/// Unified error types for the interception layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an unsafe raffle id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The transport could not produce a response (offline, DNS, timeout, reset).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The action queue could not be read, so a drain was abandoned.
    #[error("QUEUE_UNAVAILABLE: {0}")]
    QueueUnavailable(String),

    /// Stored or supplied JSON could not be encoded or decoded.
    #[error("SERIALIZATION: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error came from the network transport rather than local state.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Stable code that prefixes the `Display` output.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Network(_) => "NETWORK_ERROR",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::Database(_) | Error::MigrationFailed(_) => "CACHE_ERROR",
            Error::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            Error::Serialization(_) => "SERIALIZATION",
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Network("connection refused".to_string());
        assert!(err.to_string().starts_with("NETWORK_ERROR"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_code_matches_display_prefix() {
        let errors = [
            Error::InvalidInput("x".into()),
            Error::FetchTooLarge("x".into()),
            Error::MigrationFailed("x".into()),
            Error::QueueUnavailable("x".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(&format!("{}: ", err.code())), "{err}");
        }
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::Network("offline".into()).is_transport());
        assert!(!Error::InvalidInput("bad".into()).is_transport());
        assert!(!Error::QueueUnavailable("locked".into()).is_transport());
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
