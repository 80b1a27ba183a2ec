//! The loader - host-facing facade over the delivery pipeline
//!
//! The host wires three hooks to a [`Loader`]:
//!
//! - `install` runs the startup load: the stored record if it still
//!   verifies, otherwise a fresh fetch.
//! - `activate` has nothing to do beyond logging.
//! - `fetch` answers one intercepted request, racing the state machine
//!   against the request deadline.
//!
//! ## Transitions
//!
//! ```text
//! LOADING --stored record verifies------> READY (+ background refresh when stale)
//! LOADING --fetched payload verifies----> READY
//! LOADING --not found / rejected--------> HARD_FAIL
//! LOADING --network error---------------> SOFT_FAIL --delay--> LOADING (reset)
//! READY   --script faults---------------> RUN_FAIL
//! ```
//!
//! Every transition resolves the queued requests in arrival order.

use crate::config::LoaderConfig;
use crate::delivery::{
    DeliveryState, HandlerRegistry, HostEvent, PipelineContext, ScriptFault, ScriptRuntime,
};
use crate::error::LoaderError;
use crate::fetch::{FetchOutcome, ScriptSource, UpdateFetcher};
use crate::intercept::{Interceptor, PageKind, Request, Response};
use crate::store::{FileStore, MemoryStore, RecordStore, VerifiedRecord};
use crate::trust::{SignatureVerifier, TrustKey, VerifiedPayload};
use chrono::Utc;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, info, warn};

struct Inner {
    config: LoaderConfig,
    debug_mode: bool,
    verifier: Arc<SignatureVerifier>,
    store: Arc<dyn RecordStore>,
    fetcher: UpdateFetcher,
    runtime: Arc<dyn ScriptRuntime>,
    registry: HandlerRegistry,
    interceptor: Interceptor,
    context: Mutex<PipelineContext>,
}

/// Shared handle to one loader instance. Clones drive the same pipeline.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<Inner>,
}

impl Loader {
    pub fn builder(config: LoaderConfig) -> LoaderBuilder {
        LoaderBuilder::new(config)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn state(&self) -> DeliveryState {
        self.context().state()
    }

    pub fn is_debug_mode(&self) -> bool {
        self.inner.debug_mode
    }

    /// Registry the delivered script registers its listeners on
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Metadata and body of the script currently running
    pub fn current_payload(&self) -> Option<VerifiedPayload> {
        self.context().current().cloned()
    }

    pub fn pending_requests(&self) -> usize {
        self.context().pending_len()
    }

    /// Install hook: run the startup load unless one is already running
    pub async fn install(&self) {
        info!("Install: starting load of '{}'", self.inner.config.script_name);
        if self.context().begin_load() {
            self.startup().await;
        } else {
            debug!("Load already in flight");
        }
    }

    /// Activate hook
    pub fn activate(&self) {
        info!(state = %self.state(), "Activate");
    }

    /// Deliver a host event to the script's passthrough listeners
    pub fn dispatch_event(&self, event: &HostEvent) -> usize {
        self.inner.registry.dispatch(event)
    }

    /// Fetch hook: always resolves, at the latest when the request deadline
    /// passes
    pub async fn fetch(&self, request: Request) -> Response {
        let uri = request.uri().to_string();

        let receiver = {
            let mut context = self.context();

            if self.inner.debug_mode {
                context.transition(DeliveryState::Loading);
                if context.begin_load() {
                    self.spawn_live_fetch();
                }
            }

            let receiver = context.enqueue(uri.clone());
            if context.state().is_resolvable() {
                context.dispatch(self.inner.registry.fetch_handler());
            } else if context.begin_load() {
                debug!("Request arrived with no load in flight, starting one");
                self.spawn_startup();
            }
            receiver
        };

        let deadline = self.inner.config.request_timeout();
        let interceptor = &self.inner.interceptor;
        let answered = tokio::time::timeout(deadline, async move {
            match receiver.await {
                Ok(resolution) => Some(interceptor.respond(resolution, request).await),
                Err(_) => None,
            }
        })
        .await;

        match answered {
            Ok(Some(response)) => response,
            Ok(None) => {
                warn!(uri = %uri, "Request discarded by a state reset");
                interceptor.page(PageKind::Timeout)
            }
            Err(_) => {
                error!(
                    uri = %uri,
                    timeout_ms = self.inner.config.request_timeout_ms,
                    "Request timed out waiting for the control script"
                );
                interceptor.page(PageKind::Timeout)
            }
        }
    }

    fn context(&self) -> MutexGuard<'_, PipelineContext> {
        lock_context(&self.inner)
    }

    fn spawn_startup(&self) {
        let loader = self.clone();
        tokio::spawn(async move { loader.startup().await });
    }

    fn spawn_live_fetch(&self) {
        let loader = self.clone();
        tokio::spawn(async move {
            let outcome = loader.inner.fetcher.fetch_and_install(None).await;
            loader.settle(outcome, false);
        });
    }

    /// Startup load. The caller has claimed the load slot.
    async fn startup(&self) {
        let name = self.inner.verifier.script_name();

        let record = match self.inner.store.load(name).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                debug!("No stored record for '{}' in {} store", name, self.inner.store.name());
                None
            }
            Err(e) => {
                warn!("Record store unavailable, fetching instead: {}", e);
                None
            }
        };

        if let Some(record) = record {
            if let Some(verified) = self.inner.verifier.verify(&record.contents, None) {
                self.start_from_record(&record, verified);
                return;
            }
            warn!("Stored record for '{}' failed verification, fetching a fresh copy", name);
        }

        let outcome = self.inner.fetcher.fetch_and_install(None).await;
        self.settle(outcome, false);
    }

    fn start_from_record(&self, record: &VerifiedRecord, verified: VerifiedPayload) {
        let stale = record.needs_refresh(self.inner.config.refresh_after(), Utc::now());

        {
            let mut context = self.context();
            context.finish_load();
            if context.state() == DeliveryState::Loading {
                info!(
                    "Running stored '{}' modified {}",
                    record.filename, verified.modified_time
                );
                context.transition(DeliveryState::Ready);
                self.run_verified(&mut context, verified);
                context.dispatch(self.inner.registry.fetch_handler());
            }
        }

        if stale {
            info!(
                downloaded = %record.downloaded_time,
                "Stored record is due for a refresh"
            );
            self.spawn_refresh(record.updated_time);
        }
    }

    /// Background refresh after starting from a stale record
    fn spawn_refresh(&self, updated_time: i64) {
        let min_mod_time = self
            .inner
            .config
            .enforce_refresh_min_mod_time
            .then_some(updated_time);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let loader = Loader { inner };
            let outcome = loader.inner.fetcher.fetch_and_install(min_mod_time).await;
            loader.settle(outcome, true);
        });
    }

    /// Apply a fetch outcome to the state machine and resolve whatever
    /// became resolvable
    fn settle(&self, outcome: FetchOutcome, background: bool) {
        let mut context = self.context();
        if !background {
            context.finish_load();
        }
        let state = context.state();

        match outcome {
            FetchOutcome::Installed(verified) => {
                if state == DeliveryState::Loading || state == DeliveryState::Ready {
                    if state == DeliveryState::Loading {
                        context.transition(DeliveryState::Ready);
                    }
                    self.run_verified(&mut context, verified);
                } else {
                    debug!(state = %state, "Installed update will run on next start");
                }
            }
            FetchOutcome::NotFound | FetchOutcome::Rejected if background => {
                warn!("Background refresh failed, keeping the running script");
            }
            FetchOutcome::NetworkError if background => {
                warn!("Background refresh could not reach the network");
            }
            FetchOutcome::NotFound | FetchOutcome::Rejected => {
                if state == DeliveryState::Loading {
                    context.transition(DeliveryState::HardFail);
                }
            }
            FetchOutcome::NetworkError => {
                if state == DeliveryState::Loading {
                    context.transition(DeliveryState::SoftFail);
                    self.schedule_reset();
                }
            }
        }

        context.dispatch(self.inner.registry.fetch_handler());
    }

    /// Run a verified body; a fault or panic moves the machine to RUN_FAIL
    fn run_verified(&self, context: &mut PipelineContext, verified: VerifiedPayload) {
        let runtime = &self.inner.runtime;
        let registry = &self.inner.registry;

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.run(&verified.body, registry)
        }))
        .unwrap_or(Err(ScriptFault::Panicked));

        context.set_current(verified);
        if let Err(fault) = result {
            error!(runtime = runtime.name(), "Control script fault: {}", fault);
            context.transition(DeliveryState::RunFail);
        }
    }

    fn schedule_reset(&self) {
        let delay = self.inner.config.soft_fail_reset();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut context = lock_context(&inner);
            if context.state() == DeliveryState::SoftFail {
                info!("Soft failure expired, resetting");
                context.reset();
                inner.registry.clear();
            }
        });
    }
}

fn lock_context(inner: &Inner) -> MutexGuard<'_, PipelineContext> {
    inner
        .context
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Assembles a [`Loader`] from configuration plus host-provided parts
pub struct LoaderBuilder {
    config: LoaderConfig,
    key: Option<TrustKey>,
    source: Option<Arc<dyn ScriptSource>>,
    store: Option<Arc<dyn RecordStore>>,
    runtime: Option<Arc<dyn ScriptRuntime>>,
}

impl LoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            key: None,
            source: None,
            store: None,
            runtime: None,
        }
    }

    /// Verify against `key` instead of the configured or embedded one
    pub fn key(mut self, key: TrustKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn source(mut self, source: Arc<dyn ScriptSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn ScriptRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Loader, LoaderError> {
        let config = self.config;

        let key = match (self.key, &config.public_key) {
            (Some(key), _) => key,
            (None, Some(path)) => TrustKey::from_jwk_file(path)?,
            (None, None) => TrustKey::embedded()?,
        };

        let source = match self.source {
            Some(source) => source,
            None => default_source(&config)?,
        };

        let store: Arc<dyn RecordStore> = match (self.store, &config.store_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::new(path)),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let runtime = self.runtime.ok_or(LoaderError::MissingRuntime)?;

        let debug_mode = config.is_debug_origin();
        if debug_mode {
            warn!(
                target: "security",
                origin = %config.origin,
                "Debug origin: every request reloads the script"
            );
        }

        let verifier = Arc::new(
            SignatureVerifier::new(&key, config.script_name.clone()).with_bypass(debug_mode),
        );
        let fetcher = UpdateFetcher::new(source, verifier.clone(), store.clone());

        info!(
            script = %config.script_name,
            key = %key.fingerprint(),
            store = store.name(),
            runtime = runtime.name(),
            "Loader ready"
        );

        Ok(Loader {
            inner: Arc::new(Inner {
                interceptor: Interceptor::new(&config.site_name),
                config,
                debug_mode,
                verifier,
                store,
                fetcher,
                runtime,
                registry: HandlerRegistry::new(),
                context: Mutex::new(PipelineContext::new()),
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_source(config: &LoaderConfig) -> Result<Arc<dyn ScriptSource>, LoaderError> {
    let url = config
        .script_url
        .as_deref()
        .ok_or(LoaderError::MissingSource)?;
    let source = crate::fetch::HttpSource::new(url, config.request_timeout())
        .map_err(LoaderError::Config)?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "http"))]
fn default_source(_config: &LoaderConfig) -> Result<Arc<dyn ScriptSource>, LoaderError> {
    Err(LoaderError::MissingSource)
}
