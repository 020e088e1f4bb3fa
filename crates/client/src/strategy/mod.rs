//! Request classification and the two fetch-resolution strategies.
//!
//! | class     | strategy                          |
//! |-----------|-----------------------------------|
//! | `Ignored` | pass through, no cache involved   |
//! | `Mutable` | [`network_first`]                 |
//! | `Static`  | [`cache_first`]                   |

pub mod cache_first;
pub mod network_first;

pub use cache_first::cache_first;
pub use network_first::network_first;

use serde::Serialize;
use swcache_core::{AppConfig, Error, Request, Response};
use url::Url;

use crate::fetch::same_origin;

/// Class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    /// Different origin; not intercepted.
    Ignored,
    /// Data API request; freshest data first.
    Mutable,
    /// Everything else on the serving origin; cache first.
    Static,
}

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// Cache hit without touching the network.
    Cache,
    /// Network failed; last stored snapshot served instead.
    OfflineFallback,
}

/// A response together with how it was obtained.
#[derive(Debug)]
pub struct Resolution {
    pub response: Response,
    pub source: ResponseSource,
}

impl Resolution {
    pub fn network(response: Response) -> Self {
        Self { response, source: ResponseSource::Network }
    }

    pub fn cached(response: Response) -> Self {
        Self { response, source: ResponseSource::Cache }
    }

    pub fn offline(response: Response) -> Self {
        Self { response, source: ResponseSource::OfflineFallback }
    }
}

/// Pure classifier over the serving origin and the data API marker.
///
/// Holds no mutable state, so one selector can be shared by every request task.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    origin: Url,
    api_path_marker: String,
}

impl StrategySelector {
    pub fn new(origin: Url, api_path_marker: impl Into<String>) -> Self {
        Self { origin, api_path_marker: api_path_marker.into() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(origin, config.api_path_marker.clone()))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Classify a request.
    pub fn classify(&self, request: &Request) -> RequestClass {
        if !same_origin(&self.origin, &request.url) {
            RequestClass::Ignored
        } else if request.url.path().contains(&self.api_path_marker) {
            RequestClass::Mutable
        } else {
            RequestClass::Static
        }
    }
}
