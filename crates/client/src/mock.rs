//! Scripted transport and store helpers for tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for dependent crates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use swcache_core::cache::{GenerationInfo, ResponseStore};
use swcache_core::{CacheDb, CacheEntry, Error, Request, Response, VersionedStore};

use crate::fetch::Transport;

type Responder = Box<dyn Fn() -> Response + Send + Sync>;

enum Route {
    Respond(Responder),
    Fail,
}

/// In-process [`Transport`] answering from a per-URL script.
///
/// Unscripted URLs fail like an unreachable host. Every call, answered or
/// not, is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<String, Route>,
    offline: AtomicBool,
    log: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with a same-origin response carrying `status` and `body`.
    pub fn respond(self, url: &Url, status: u16, body: &str) -> Self {
        let final_url = url.clone();
        let body = body.to_string();
        self.respond_with(url, move || Response::new(final_url.clone(), status, body.clone()))
    }

    /// Answer `url` with whatever `responder` builds on each call.
    pub fn respond_with(mut self, url: &Url, responder: impl Fn() -> Response + Send + Sync + 'static) -> Self {
        self.routes.insert(url.to_string(), Route::Respond(Box::new(responder)));
        self
    }

    /// Fail `url` with a network error.
    pub fn fail(mut self, url: &Url) -> Self {
        self.routes.insert(url.to_string(), Route::Fail);
        self
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of calls made for `url`.
    pub fn calls(&self, url: &Url) -> usize {
        self.requests().iter().filter(|r| r.url == *url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests().len()
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {} {}", request.method, request.url)));
        }

        match self.routes.get(request.url.as_str()) {
            Some(Route::Respond(responder)) => Ok(responder()),
            Some(Route::Fail) => Err(Error::Network(format!("connection refused: {}", request.url))),
            None => Err(Error::Network(format!("no route to {}", request.url))),
        }
    }
}

/// Store wrapper whose entry reads and writes always fail.
///
/// Generation bookkeeping is delegated so a [`VersionedStore`] can still be
/// opened over it.
pub struct BrokenEntries {
    inner: CacheDb,
}

#[async_trait]
impl ResponseStore for BrokenEntries {
    async fn create_generation(&self, name: &str) -> Result<(), Error> {
        self.inner.create_generation(name).await
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.inner.generations().await
    }

    async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete_generation(name).await
    }

    async fn get_entry(&self, _generation: &str, _request_key: &str) -> Result<Option<CacheEntry>, Error> {
        Err(Error::Serialization("corrupt cache entry".into()))
    }

    async fn put_entry(&self, _entry: &CacheEntry) -> Result<(), Error> {
        Err(Error::Serialization("cache is read-only".into()))
    }
}

/// A store over a fresh in-memory database, bound to `generation`.
pub async fn test_store(generation: &str) -> VersionedStore {
    let db = CacheDb::open_in_memory().await.expect("in-memory cache db");
    VersionedStore::open(Arc::new(db), generation).await.expect("open generation")
}

/// A store whose entry reads and writes always fail.
pub async fn broken_store() -> VersionedStore {
    let inner = CacheDb::open_in_memory().await.expect("in-memory cache db");
    VersionedStore::open(Arc::new(BrokenEntries { inner }), "broken").await.expect("open generation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_and_unscripted_routes() {
        let ok = Url::parse("https://app.example/ok").unwrap();
        let down = Url::parse("https://app.example/down").unwrap();
        let transport = MockTransport::new().respond(&ok, 200, "fine").fail(&down);

        assert_eq!(transport.fetch(&Request::get(ok.clone())).await.unwrap().status, 200);
        assert!(transport.fetch(&Request::get(down.clone())).await.is_err());
        let elsewhere = Url::parse("https://app.example/elsewhere").unwrap();
        assert!(transport.fetch(&Request::get(elsewhere)).await.is_err());
        assert_eq!(transport.calls(&ok), 1);
        assert_eq!(transport.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_offline_overrides_routes() {
        let ok = Url::parse("https://app.example/ok").unwrap();
        let transport = MockTransport::new().respond(&ok, 200, "fine");

        transport.set_offline(true);
        assert!(matches!(transport.fetch(&Request::get(ok.clone())).await, Err(Error::Network(_))));
        transport.set_offline(false);
        assert!(transport.fetch(&Request::get(ok)).await.is_ok());
    }
}
