//! Lifecycle controller: install, activate, then route requests and sync signals.
//!
//! ```text
//! Installing ──install──▶ Installed ──activate──▶ Activating ──▶ Active
//!     │                                               │            │
//!     └─────── generation unavailable ────────────────┴── retire ──┴──▶ Redundant
//! ```
//!
//! Until the controller is `Active` (and again once it is `Redundant`)
//! intercepted requests are not controlled: they go straight to the transport.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use url::Url;

use swcache_client::{
    DrainReport, OfflineActionQueue, RequestClass, Resolution, StrategySelector, Transport, cache_first,
    network_first,
};
use swcache_core::{
    ActionStore, AppConfig, Error, EvictionReport, NewAction, QueuedAction, Request, ResponseStore, VersionedStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }

    /// Only an active controller intercepts requests.
    pub fn controls_requests(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals delivered to the controller.
#[derive(Debug)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Enqueue(NewAction),
    Retire,
}

/// Result of handling one [`Event`].
#[derive(Debug)]
pub enum Outcome {
    Installed { generation: String, seeded: bool },
    Activated { generation: String, eviction: EvictionReport },
    /// A response for an intercepted request. `controlled` is false when the
    /// request went straight to the transport.
    Response { class: RequestClass, controlled: bool, resolution: Resolution },
    Drained(DrainReport),
    Enqueued(QueuedAction),
    Retired,
    Ignored { reason: String },
}

/// Behaviour switches taken from configuration.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub cache_name: String,
    pub shell_url: Url,
    pub sync_tag: String,
    pub queue_failed_mutations: bool,
}

impl ControllerOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let shell_url = config.shell_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            cache_name: config.cache_name.clone(),
            shell_url,
            sync_tag: config.sync_tag.clone(),
            queue_failed_mutations: config.queue_failed_mutations,
        })
    }
}

/// Owns the lifecycle state and dispatches events to the strategies and queue.
pub struct LifecycleController {
    options: ControllerOptions,
    backend: Arc<dyn ResponseStore>,
    transport: Arc<dyn Transport>,
    selector: StrategySelector,
    queue: OfflineActionQueue,
    state: RwLock<LifecycleState>,
    store: OnceCell<VersionedStore>,
}

impl LifecycleController {
    pub fn new(
        options: ControllerOptions, backend: Arc<dyn ResponseStore>, actions: Arc<dyn ActionStore>,
        transport: Arc<dyn Transport>, selector: StrategySelector, action_route: &str,
    ) -> Self {
        let queue = OfflineActionQueue::new(actions, selector.origin().clone(), action_route);
        Self {
            options,
            backend,
            transport,
            selector,
            queue,
            state: RwLock::new(LifecycleState::Installing),
            store: OnceCell::new(),
        }
    }

    /// Build a controller from configuration over one database handle.
    pub fn from_config<B>(config: &AppConfig, db: Arc<B>, transport: Arc<dyn Transport>) -> Result<Self, Error>
    where
        B: ResponseStore + ActionStore + 'static,
    {
        let options = ControllerOptions::from_config(config)?;
        let selector = StrategySelector::from_config(config)?;
        Ok(Self::new(options, db.clone(), db, transport, selector, &config.action_route))
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Serving origin; relative request URLs resolve against it.
    pub fn origin(&self) -> &Url {
        self.selector.origin()
    }

    pub fn queue(&self) -> &OfflineActionQueue {
        &self.queue
    }

    /// Dispatch one event to its handler.
    pub async fn handle(&self, event: Event) -> Result<Outcome, Error> {
        match event {
            Event::Install => self.install().await,
            Event::Activate => self.activate().await,
            Event::Fetch(request) => self.fetch(request).await,
            Event::Sync { tag } => self.sync(&tag).await,
            Event::Enqueue(action) => self.enqueue(action).await,
            Event::Retire => {
                self.retire().await;
                Ok(Outcome::Retired)
            }
        }
    }

    /// Open the configured generation and seed it with the app shell.
    ///
    /// Seeding is best-effort. Failing to open the generation makes the
    /// controller redundant.
    pub async fn install(&self) -> Result<Outcome, Error> {
        {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Installing | LifecycleState::Installed => *state = LifecycleState::Installing,
                other => return Err(Error::InvalidInput(format!("cannot install while {other}"))),
            }
        }

        let store = match self.open_store().await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(generation = %self.options.cache_name, error = %e, "install failed");
                *self.state.write().await = LifecycleState::Redundant;
                return Err(e);
            }
        };

        let seeded = self.seed(store).await;
        *self.state.write().await = LifecycleState::Installed;
        tracing::info!(generation = %store.generation(), seeded, "installed");

        Ok(Outcome::Installed { generation: store.generation().to_string(), seeded })
    }

    /// Delete every other generation and take control of requests.
    ///
    /// Activation succeeds even when some stale generations could not be
    /// deleted; the report lists them.
    pub async fn activate(&self) -> Result<Outcome, Error> {
        {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Installed => *state = LifecycleState::Activating,
                LifecycleState::Active => {
                    return Ok(Outcome::Ignored { reason: "already active".into() });
                }
                other => return Err(Error::InvalidInput(format!("cannot activate while {other}"))),
            }
        }

        let Some(store) = self.store.get() else {
            *self.state.write().await = LifecycleState::Installed;
            return Err(Error::InvalidInput("no generation opened".into()));
        };

        let eviction = match store.evict_stale().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "could not list stale generations");
                EvictionReport::default()
            }
        };

        *self.state.write().await = LifecycleState::Active;
        tracing::info!(
            generation = %store.generation(),
            deleted = eviction.deleted.len(),
            failed = eviction.failed.len(),
            "activated, controlling requests"
        );

        Ok(Outcome::Activated { generation: store.generation().to_string(), eviction })
    }

    /// Route an intercepted request.
    pub async fn fetch(&self, request: Request) -> Result<Outcome, Error> {
        let class = self.selector.classify(&request);
        let state = self.state().await;

        let store = match self.store.get() {
            Some(store) if state.controls_requests() && class != RequestClass::Ignored => store,
            _ => {
                tracing::trace!(url = %request.url, %state, ?class, "passing request through");
                let response = self.transport.fetch(&request).await?;
                return Ok(Outcome::Response { class, controlled: false, resolution: Resolution::network(response) });
            }
        };

        let result = match class {
            RequestClass::Mutable => network_first(store, self.transport.as_ref(), &request).await,
            _ => cache_first(store, self.transport.as_ref(), &request).await,
        };

        match result {
            Ok(resolution) => Ok(Outcome::Response { class, controlled: true, resolution }),
            Err(e) => {
                if e.is_transport() {
                    self.capture_failed(&request).await;
                }
                Err(e)
            }
        }
    }

    /// Drain the action queue when `tag` is the configured sync tag.
    pub async fn sync(&self, tag: &str) -> Result<Outcome, Error> {
        if tag != self.options.sync_tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(Outcome::Ignored { reason: format!("unknown sync tag: {tag}") });
        }

        let state = self.state().await;
        if !state.controls_requests() {
            return Ok(Outcome::Ignored { reason: format!("controller is {state}") });
        }

        self.queue.drain(self.transport.as_ref()).await.map(Outcome::Drained)
    }

    pub async fn enqueue(&self, action: NewAction) -> Result<Outcome, Error> {
        let queued = self.queue.enqueue(&action.raffle_id, action.action_type, action.params).await?;
        Ok(Outcome::Enqueued(queued))
    }

    /// Give up control; later requests pass straight through.
    pub async fn retire(&self) {
        let mut state = self.state.write().await;
        let from = *state;
        if from != LifecycleState::Redundant {
            tracing::info!(%from, "retiring controller");
            *state = LifecycleState::Redundant;
        }
    }

    async fn open_store(&self) -> Result<&VersionedStore, Error> {
        self.store
            .get_or_try_init(|| VersionedStore::open(self.backend.clone(), self.options.cache_name.clone()))
            .await
    }

    async fn seed(&self, store: &VersionedStore) -> bool {
        let request = Request::get(self.options.shell_url.clone());
        match self.transport.fetch(&request).await {
            Ok(response) if response.ok() => match store.put(&request, response.duplicate()).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "failed to store app shell");
                    false
                }
            },
            Ok(response) => {
                tracing::warn!(url = %request.url, status = response.status, "app shell not cached");
                false
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "failed to fetch app shell");
                false
            }
        }
    }

    async fn capture_failed(&self, request: &Request) {
        if !self.options.queue_failed_mutations {
            return;
        }
        let Some(action) = self.queue.capture(request) else { return };

        match self.queue.enqueue(&action.raffle_id, action.action_type, action.params).await {
            Ok(queued) => tracing::info!(id = queued.id, url = %request.url, "queued failed action for replay"),
            Err(e) => tracing::error!(url = %request.url, error = %e, "failed to queue action"),
        }
    }
}
