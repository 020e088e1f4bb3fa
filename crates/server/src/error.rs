//! Structured errors for the swcache host protocol.
//!
//! Core errors keep their stable code; frame-level problems use `INVALID_INPUT`.

use serde::Serialize;
use swcache_core::Error;

/// Errors produced while handling one host frame.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The line was not a valid event frame.
    #[error("INVALID_INPUT: malformed frame: {0}")]
    MalformedFrame(String),

    /// The event was handled and failed.
    #[error(transparent)]
    Core(#[from] Error),
}

/// Error payload of a reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<HostError> for ErrorBody {
    fn from(err: HostError) -> Self {
        match err {
            HostError::MalformedFrame(msg) => ErrorBody { code: "INVALID_INPUT", message: format!("malformed frame: {msg}") },
            HostError::Core(e) => {
                let code = e.code();
                let text = e.to_string();
                let message = text.strip_prefix(code).and_then(|m| m.strip_prefix(": ")).unwrap_or(&text).to_string();
                ErrorBody { code, message }
            }
        }
    }
}
