//! Backend contract for the generation-namespaced response cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::http::Response;

/// A stored response snapshot.
///
/// Entries are replaced wholesale on write and never mutated in place.
#[derive(Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// Generation (cache name) that owns this entry.
    pub generation: String,
    /// See [`crate::cache::hash::compute_request_key`].
    pub request_key: String,
    /// Method of the request that produced the response.
    pub method: String,
    /// URL of the request that produced the response.
    pub url: String,
    pub response: Response,
    /// RFC 3339 time of the write.
    pub stored_at: String,
}

/// Summary row for a generation, used by operator tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub name: String,
    pub created_at: String,
    pub entries: u64,
}

/// Persistent key-value storage with generation namespaces.
///
/// Implementations must make `put_entry` and `delete_generation` atomic.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Create the generation if it does not exist yet.
    async fn create_generation(&self, name: &str) -> Result<(), Error>;

    /// All known generations, oldest first.
    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error>;

    /// Remove a generation and all of its entries.
    ///
    /// Returns false if the generation did not exist.
    async fn delete_generation(&self, name: &str) -> Result<bool, Error>;

    /// Look up an entry. A miss is `Ok(None)`.
    async fn get_entry(&self, generation: &str, request_key: &str) -> Result<Option<CacheEntry>, Error>;

    /// Insert or replace the entry for its (generation, request key).
    async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error>;
}
