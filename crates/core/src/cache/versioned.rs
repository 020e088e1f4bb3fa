//! The active cache generation.
//!
//! A [`VersionedStore`] is bound to exactly one generation name, supplied by
//! configuration. Reads and writes only ever touch that generation; every
//! other generation is garbage once [`VersionedStore::delete_generations_except`]
//! runs at activation.

use std::sync::Arc;

use serde::Serialize;

use super::store::{CacheEntry, ResponseStore};
use crate::Error;
use crate::http::{Request, Response};

/// Outcome of evicting stale generations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Generations that were removed.
    pub deleted: Vec<String>,
    /// Generations whose removal failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl EvictionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to the single active cache generation.
#[derive(Clone)]
pub struct VersionedStore {
    backend: Arc<dyn ResponseStore>,
    generation: String,
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore").field("generation", &self.generation).finish_non_exhaustive()
    }
}

impl VersionedStore {
    /// Open (creating if absent) the named generation.
    ///
    /// Opening the same generation twice is harmless.
    pub async fn open(backend: Arc<dyn ResponseStore>, generation: impl Into<String>) -> Result<Self, Error> {
        let generation = generation.into();
        if generation.trim().is_empty() {
            return Err(Error::InvalidInput("generation name cannot be empty".into()));
        }

        backend.create_generation(&generation).await?;
        tracing::debug!(generation = %generation, "opened cache generation");

        Ok(Self { backend, generation })
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Look up the stored response for a request in the active generation.
    ///
    /// A miss is `Ok(None)`; errors only report backend faults.
    pub async fn get(&self, request: &Request) -> Result<Option<CacheEntry>, Error> {
        self.backend.get_entry(&self.generation, &request.cache_key()).await
    }

    /// Store a response snapshot for a request, replacing any previous one.
    ///
    /// The snapshot must be a [`Response::duplicate`] of whatever is handed
    /// back to the caller.
    pub async fn put(&self, request: &Request, snapshot: Response) -> Result<(), Error> {
        let entry = CacheEntry {
            generation: self.generation.clone(),
            request_key: request.cache_key(),
            method: request.method.clone(),
            url: request.url.to_string(),
            response: snapshot,
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        self.backend.put_entry(&entry).await
    }

    /// Remove every generation other than `current`.
    ///
    /// Each generation is deleted independently: a failure is recorded in the
    /// report and the remaining generations are still processed. Only failing
    /// to enumerate generations is an error.
    pub async fn delete_generations_except(&self, current: &str) -> Result<EvictionReport, Error> {
        let generations = self.backend.generations().await?;
        let mut report = EvictionReport::default();

        for info in generations.into_iter().filter(|g| g.name != current) {
            match self.backend.delete_generation(&info.name).await {
                Ok(_) => {
                    tracing::debug!(generation = %info.name, "deleted stale cache generation");
                    report.deleted.push(info.name);
                }
                Err(e) => {
                    tracing::warn!(generation = %info.name, error = %e, "failed to delete stale cache generation");
                    report.failed.push((info.name, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Shorthand for evicting everything but this store's own generation.
    pub async fn evict_stale(&self) -> Result<EvictionReport, Error> {
        self.delete_generations_except(&self.generation).await
    }
}
