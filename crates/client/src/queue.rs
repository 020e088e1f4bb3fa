//! Offline action queue: capture, replay and drain.
//!
//! ```text
//! Pending ──replay ok (status < 400)──▶ Removed
//!    ▲
//!    └──── transport error / 4xx / 5xx ──┘ (left in place)
//! ```
//!
//! Items leave the queue only through a successful replay or a manual
//! [`OfflineActionQueue::remove`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use swcache_core::queue::validate_segment;
use swcache_core::{ActionStore, ActionType, AppConfig, Error, NewAction, QueuedAction, Request};

use crate::fetch::{Transport, same_origin};

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Ids replayed successfully and removed.
    pub replayed: Vec<i64>,
    /// Ids whose replay failed, with the reason; still pending.
    pub failed: Vec<(i64, String)>,
    /// Ids replayed successfully but already removed by someone else.
    pub already_removed: Vec<i64>,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.replayed.len() + self.failed.len() + self.already_removed.len()
    }
}

/// Durable FIFO of actions that failed to reach the server.
pub struct OfflineActionQueue {
    store: Arc<dyn ActionStore>,
    origin: Url,
    action_route: String,
    drain_lock: Mutex<()>,
}

impl std::fmt::Debug for OfflineActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineActionQueue")
            .field("origin", &self.origin.as_str())
            .field("action_route", &self.action_route)
            .finish_non_exhaustive()
    }
}

impl OfflineActionQueue {
    /// Create a queue replaying against `{origin}{action_route}/{raffle_id}/{action_type}`.
    pub fn new(store: Arc<dyn ActionStore>, origin: Url, action_route: impl Into<String>) -> Self {
        let action_route = action_route.into().trim_end_matches('/').to_string();
        Self { store, origin, action_route, drain_lock: Mutex::new(()) }
    }

    pub fn from_config(store: Arc<dyn ActionStore>, config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(store, origin, config.action_route.clone()))
    }

    pub async fn enqueue(
        &self, raffle_id: &str, action_type: ActionType, params: serde_json::Value,
    ) -> Result<QueuedAction, Error> {
        let action = NewAction::new(raffle_id, action_type, params)?;
        self.store.enqueue(action).await
    }

    /// Pending actions in enqueue order.
    pub async fn pending(&self) -> Result<Vec<QueuedAction>, Error> {
        self.store.pending().await
    }

    /// Drop an action without replaying it. Returns false if it was not queued.
    pub async fn remove(&self, id: i64) -> Result<bool, Error> {
        self.store.remove(id).await
    }

    /// Endpoint an action is replayed against.
    pub fn endpoint(&self, raffle_id: &str, action_type: &ActionType) -> Result<Url, Error> {
        validate_segment("raffle id", raffle_id)?;
        let path = format!("{}/{}/{}", self.action_route, raffle_id, action_type);
        self.origin.join(&path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }

    /// The request that replays a queued action.
    pub fn replay_request(&self, action: &QueuedAction) -> Result<Request, Error> {
        let url = self.endpoint(&action.raffle_id, &action.action_type)?;
        let body = serde_json::to_vec(&action.replay_body())?;
        Ok(Request::new("POST", url).with_header("content-type", "application/json").with_body(body))
    }

    /// Recognize a `POST {action_route}/{raffle_id}/{action_type}` on the serving
    /// origin and turn it into a queueable action.
    ///
    /// The request body becomes the params; a missing or empty body becomes
    /// `null`, a non-JSON body is kept as a JSON string.
    pub fn capture(&self, request: &Request) -> Option<NewAction> {
        if request.method != "POST" || !same_origin(&self.origin, &request.url) {
            return None;
        }

        let rest = request.url.path().strip_prefix(&self.action_route)?.strip_prefix('/')?;
        let (raffle_id, action_type) = rest.split_once('/')?;
        let action_type: ActionType = action_type.parse().ok()?;

        let params = match request.body.as_deref() {
            None | Some([]) => serde_json::Value::Null,
            Some(body) => serde_json::from_slice(body)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned())),
        };

        NewAction::new(raffle_id, action_type, params).ok()
    }

    /// Replay every pending action once, oldest first.
    ///
    /// Drains are serialized: a trigger arriving mid-drain waits and then sees
    /// only what is still pending. Failing to read the queue aborts the drain
    /// with [`Error::QueueUnavailable`]; individual replay failures never do.
    pub async fn drain(&self, transport: &dyn Transport) -> Result<DrainReport, Error> {
        let _guard = self.drain_lock.lock().await;

        let pending = self.store.pending().await.map_err(|e| {
            tracing::error!(error = %e, "failed to read action queue, drain aborted");
            Error::QueueUnavailable(e.to_string())
        })?;

        let mut report = DrainReport::default();
        if pending.is_empty() {
            tracing::debug!("action queue empty, nothing to drain");
            return Ok(report);
        }

        tracing::info!(count = pending.len(), "draining action queue");

        for action in pending {
            match self.replay(transport, &action).await {
                Ok(()) => match self.store.remove(action.id).await {
                    Ok(true) => report.replayed.push(action.id),
                    Ok(false) => {
                        tracing::debug!(id = action.id, "replayed action was already removed");
                        report.already_removed.push(action.id);
                    }
                    Err(e) => {
                        tracing::error!(id = action.id, error = %e, "replayed action could not be removed");
                        report.failed.push((action.id, e.to_string()));
                    }
                },
                Err(reason) => {
                    tracing::error!(
                        id = action.id,
                        raffle_id = %action.raffle_id,
                        action = %action.action_type,
                        reason = %reason,
                        "action replay failed, keeping it queued"
                    );
                    report.failed.push((action.id, reason));
                }
            }
        }

        tracing::info!(
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            already_removed = report.already_removed.len(),
            "action queue drained"
        );

        Ok(report)
    }

    async fn replay(&self, transport: &dyn Transport, action: &QueuedAction) -> Result<(), String> {
        let request = self.replay_request(action).map_err(|e| e.to_string())?;
        let response = transport.fetch(&request).await.map_err(|e| e.to_string())?;
        if response.status < 400 { Ok(()) } else { Err(format!("server answered {}", response.status)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use swcache_core::CacheDb;

    async fn queue() -> OfflineActionQueue {
        let db = CacheDb::open_in_memory().await.unwrap();
        OfflineActionQueue::new(Arc::new(db), Url::parse("https://app.example").unwrap(), "/api/admin/raffles")
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://app.example{path}")).unwrap()
    }

    fn ids(actions: &[QueuedAction]) -> Vec<i64> {
        actions.iter().map(|a| a.id).collect()
    }

    /// Store whose reads always fail.
    struct Unreadable;

    #[async_trait]
    impl ActionStore for Unreadable {
        async fn enqueue(&self, _action: NewAction) -> Result<QueuedAction, Error> {
            Err(Error::Serialization("unwritable".into()))
        }

        async fn pending(&self) -> Result<Vec<QueuedAction>, Error> {
            Err(Error::Serialization("unreadable".into()))
        }

        async fn remove(&self, _id: i64) -> Result<bool, Error> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_replay_request_shape() {
        let queue = queue().await;
        let action = queue.enqueue("5", ActionType::Draw, json!({"winners": 3})).await.unwrap();

        let request = queue.replay_request(&action).unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, url("/api/admin/raffles/5/draw"));
        assert_eq!(request.headers.get("content-type").map(String::as_str), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"winners": 3}));
    }

    #[tokio::test]
    async fn test_replay_request_null_params_is_empty_object() {
        let queue = queue().await;
        let action = queue.enqueue("5", ActionType::Pause, serde_json::Value::Null).await.unwrap();

        let request = queue.replay_request(&action).unwrap();

        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn test_drain_partial_failure_keeps_failed_in_order() {
        let queue = queue().await;
        let a = queue.enqueue("1", ActionType::Draw, json!({})).await.unwrap();
        let b = queue.enqueue("2", ActionType::Draw, json!({})).await.unwrap();
        let c = queue.enqueue("3", ActionType::Draw, json!({})).await.unwrap();
        let transport = MockTransport::new()
            .fail(&url("/api/admin/raffles/1/draw"))
            .respond(&url("/api/admin/raffles/2/draw"), 200, "{}")
            .respond(&url("/api/admin/raffles/3/draw"), 500, "boom");

        let report = queue.drain(&transport).await.unwrap();

        assert_eq!(report.replayed, vec![b.id]);
        assert_eq!(report.failed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![a.id, c.id]);
        assert_eq!(ids(&queue.pending().await.unwrap()), vec![a.id, c.id]);
        assert_eq!(transport.calls(&url("/api/admin/raffles/2/draw")), 1);
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order() {
        let queue = queue().await;
        queue.enqueue("9", ActionType::Start, json!({})).await.unwrap();
        queue.enqueue("1", ActionType::Close, json!({})).await.unwrap();
        let transport = MockTransport::new()
            .respond(&url("/api/admin/raffles/9/start"), 204, "")
            .respond(&url("/api/admin/raffles/1/close"), 302, "");

        let report = queue.drain(&transport).await.unwrap();

        assert_eq!(report.replayed.len(), 2);
        let order: Vec<String> = transport.requests().iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(order, vec!["/api/admin/raffles/9/start", "/api/admin/raffles/1/close"]);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_empty_queue_is_noop() {
        let queue = queue().await;
        let transport = MockTransport::new();

        let report = queue.drain(&transport).await.unwrap();

        assert_eq!(report, DrainReport::default());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_drain_twice_replays_once() {
        let queue = queue().await;
        queue.enqueue("5", ActionType::Draw, json!({})).await.unwrap();
        let transport = MockTransport::new().respond(&url("/api/admin/raffles/5/draw"), 200, "{}");

        let (first, second) = tokio::join!(queue.drain(&transport), queue.drain(&transport));

        assert_eq!(first.unwrap().attempted() + second.unwrap().attempted(), 1);
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_drain_unreadable_queue_aborts() {
        let queue = OfflineActionQueue::new(Arc::new(Unreadable), url("/"), "/api/admin/raffles");
        let transport = MockTransport::new();

        let result = queue.drain(&transport).await;

        assert!(matches!(result, Err(Error::QueueUnavailable(_))));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_remove() {
        let queue = queue().await;
        let action = queue.enqueue("5", ActionType::Cancel, json!({})).await.unwrap();

        assert!(queue.remove(action.id).await.unwrap());
        assert!(!queue.remove(action.id).await.unwrap());
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unsafe_raffle_id() {
        let queue = queue().await;
        let result = queue.enqueue("../5", ActionType::Draw, json!({})).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_capture_matches_action_route() {
        let queue = queue().await;
        let request = Request::new("POST", url("/api/admin/raffles/5/draw")).with_body(r#"{"winners":2}"#);

        let action = queue.capture(&request).unwrap();

        assert_eq!(action.raffle_id, "5");
        assert_eq!(action.action_type, ActionType::Draw);
        assert_eq!(action.params, json!({"winners": 2}));
    }

    #[tokio::test]
    async fn test_capture_body_variants() {
        let queue = queue().await;
        let empty = Request::new("POST", url("/api/admin/raffles/5/pause"));
        assert_eq!(queue.capture(&empty).unwrap().params, serde_json::Value::Null);

        let text = Request::new("POST", url("/api/admin/raffles/5/pause")).with_body("reason=late");
        assert_eq!(queue.capture(&text).unwrap().params, json!("reason=late"));
    }

    #[tokio::test]
    async fn test_capture_rejects_other_requests() {
        let queue = queue().await;
        let cases = [
            Request::get(url("/api/admin/raffles/5/draw")),
            Request::new("POST", url("/api/admin/raffles/5")),
            Request::new("POST", url("/api/admin/raffles/5/draw/extra")),
            Request::new("POST", url("/api/admin/rafflesX/5/draw")),
            Request::new("POST", url("/api/other/5/draw")),
            Request::new("POST", Url::parse("https://other-origin.example/api/admin/raffles/5/draw").unwrap()),
        ];
        for request in cases {
            assert!(queue.capture(&request).is_none(), "{} {}", request.method, request.url);
        }
    }
}
