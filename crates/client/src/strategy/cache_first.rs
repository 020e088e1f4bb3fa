//! Cache-first resolution for static assets.

use swcache_core::{Error, Request, ResponseType, VersionedStore};

use super::Resolution;
use crate::fetch::Transport;

/// Serve from the active generation when possible, populating it on a miss.
///
/// A hit never touches the network. On a miss the network answer is returned
/// as-is; only a `200` same-origin (`basic`) answer is written back. Transport
/// errors on a miss propagate: there is nothing to fall back to.
pub async fn cache_first(
    store: &VersionedStore, transport: &dyn Transport, request: &Request,
) -> Result<Resolution, Error> {
    if !request.is_cacheable() {
        return transport.fetch(request).await.map(Resolution::network);
    }

    match store.get(request).await {
        Ok(Some(entry)) => {
            tracing::trace!(url = %request.url, "cache hit");
            return Ok(Resolution::cached(entry.response));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(url = %request.url, error = %e, "cache lookup failed, treating as miss"),
    }

    let response = transport.fetch(request).await?;

    if response.status != 200 || response.response_type != ResponseType::Basic {
        tracing::debug!(
            url = %request.url,
            status = response.status,
            response_type = %response.response_type,
            "not caching response"
        );
        return Ok(Resolution::network(response));
    }

    if let Err(e) = store.put(request, response.duplicate()).await {
        tracing::warn!(url = %request.url, error = %e, "failed to cache static response");
    }

    Ok(Resolution::network(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, broken_store, test_store};
    use crate::strategy::ResponseSource;
    use bytes::Bytes;
    use swcache_core::Response;
    use url::Url;

    fn asset(path: &str) -> Request {
        Request::get(Url::parse(&format!("https://app.example{path}")).unwrap())
    }

    #[tokio::test]
    async fn test_hit_skips_network() {
        let store = test_store("v1").await;
        let request = asset("/styles.css");
        store.put(&request, Response::new(request.url.clone(), 200, "body{}")).await.unwrap();
        let transport = MockTransport::new();

        let resolved = cache_first(&store, &transport, &request).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Cache);
        assert_eq!(resolved.response.body, Bytes::from("body{}"));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let store = test_store("v1").await;
        let request = asset("/styles.css");
        let transport = MockTransport::new().respond(&request.url, 200, "body{}");

        let first = cache_first(&store, &transport, &request).await.unwrap();
        let second = cache_first(&store, &transport, &request).await.unwrap();

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(first.response, second.response);
        assert_eq!(transport.calls(&request.url), 1);
    }

    #[tokio::test]
    async fn test_404_returned_not_cached() {
        let store = test_store("v1").await;
        let request = asset("/missing.png");
        let transport = MockTransport::new().respond(&request.url, 404, "not found");

        let resolved = cache_first(&store, &transport, &request).await.unwrap();

        assert_eq!(resolved.response.status, 404);
        assert!(store.get(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_200_success_not_cached() {
        let store = test_store("v1").await;
        let request = asset("/partial.bin");
        let transport = MockTransport::new().respond(&request.url, 206, "part");

        cache_first(&store, &transport, &request).await.unwrap();

        assert!(store.get(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cross_origin_response_not_cached() {
        let store = test_store("v1").await;
        let request = asset("/font.woff2");
        let cdn = Url::parse("https://cdn.example/font.woff2").unwrap();
        let transport = MockTransport::new()
            .respond_with(&request.url, move || Response::new(cdn.clone(), 200, "font").with_type(ResponseType::Cors));

        let resolved = cache_first(&store, &transport, &request).await.unwrap();

        assert_eq!(resolved.response.response_type, ResponseType::Cors);
        assert!(store.get(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_miss_offline_propagates() {
        let store = test_store("v1").await;
        let request = asset("/app.js");
        let transport = MockTransport::new().fail(&request.url);

        let result = cache_first(&store, &transport, &request).await;

        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_cache_failure_falls_through_to_network() {
        let store = broken_store().await;
        let request = asset("/app.js");
        let transport = MockTransport::new().respond(&request.url, 200, "js");

        let resolved = cache_first(&store, &transport, &request).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Network);
        assert_eq!(resolved.response.body, Bytes::from("js"));
    }

    #[tokio::test]
    async fn test_non_get_bypasses_cache() {
        let store = test_store("v1").await;
        let get = asset("/form");
        store.put(&get, Response::new(get.url.clone(), 200, "cached form")).await.unwrap();
        let post = Request::new("POST", get.url.clone());
        let transport = MockTransport::new().respond(&post.url, 200, "submitted");

        let resolved = cache_first(&store, &transport, &post).await.unwrap();

        assert_eq!(resolved.source, ResponseSource::Network);
        assert_eq!(resolved.response.body, Bytes::from("submitted"));
        let entry = store.get(&get).await.unwrap().unwrap();
        assert_eq!(entry.response.body, Bytes::from("cached form"));
    }
}
