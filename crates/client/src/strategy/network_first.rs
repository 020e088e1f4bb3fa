//! Network-first resolution for data API requests.

use swcache_core::{Error, Request, VersionedStore};

use super::Resolution;
use crate::fetch::Transport;

/// Resolve a request against the network, falling back to the last stored
/// snapshot only when the transport fails.
///
/// 1. Fetch; any status counts as an answer and is returned unchanged
/// 2. 2xx answers to cacheable requests are duplicated into the store
/// 3. On transport failure serve the stored snapshot, or propagate the error
///
/// Cache reads and writes are best-effort: a store fault is logged and never
/// replaces the answer or the original network error.
pub async fn network_first(
    store: &VersionedStore, transport: &dyn Transport, request: &Request,
) -> Result<Resolution, Error> {
    match transport.fetch(request).await {
        Ok(response) => {
            if response.ok() && request.is_cacheable() {
                let snapshot = response.duplicate();
                if let Err(e) = store.put(request, snapshot).await {
                    tracing::warn!(url = %request.url, error = %e, "failed to cache api response");
                }
            }
            Ok(Resolution::network(response))
        }
        Err(network_err) if network_err.is_transport() && request.is_cacheable() => {
            match store.get(request).await {
                Ok(Some(entry)) => {
                    tracing::debug!(url = %request.url, stored_at = %entry.stored_at, "network failed, serving cached api response");
                    Ok(Resolution::offline(entry.response))
                }
                Ok(None) => Err(network_err),
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "cache lookup failed after network error");
                    Err(network_err)
                }
            }
        }
        Err(e) => Err(e),
    }
}
