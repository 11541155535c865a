//! The polling loop and its change detection
//!
//! One [`PollEngine`] owns one background task. Each tick it snapshots the
//! subscription registry, fetches every owner's items (in batches when
//! configured), compares value hashes against the cache and hands all
//! changes of the cycle to the callback as a single batch.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::PollConfig;
use crate::error::{FetchError, PollError, Result};
use crate::fetcher::{ItemFetcher, PersistenceHook};
use crate::registry::{Observation, SubscriptionRegistry};
use crate::update::Update;

/// Receives every non-empty batch detected in one cycle
pub type UpdateCallback<I> = Arc<dyn Fn(Vec<Update<I>>) + Send + Sync>;

/// Counters describing the engine's activity
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub cycles: u64,
    pub updates_emitted: u64,
    pub fetch_errors: u64,
    pub last_cycle: Option<DateTime<Utc>>,
    pub owners: usize,
    pub items: usize,
}

impl fmt::Display for PollStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} owners / {} items, {} cycles, {} updates, {} fetch errors",
            self.owners, self.items, self.cycles, self.updates_emitted, self.fetch_errors
        )
    }
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct EngineInner<F: ItemFetcher> {
    config: PollConfig,
    fetcher: Arc<F>,
    registry: Mutex<SubscriptionRegistry<F::Id>>,
    callback: RwLock<Option<UpdateCallback<F::Item>>>,
    hook: RwLock<Option<Arc<dyn PersistenceHook<F::Item>>>>,
    stats: Mutex<PollStats>,
}

/// Change-detecting subscription poller, generic over the protocol fetcher
pub struct PollEngine<F: ItemFetcher> {
    inner: Arc<EngineInner<F>>,
    task: Mutex<Option<RunningTask>>,
}

impl<F: ItemFetcher> PollEngine<F> {
    /// Create an idle engine. Call [`start`](Self::start) to begin polling.
    pub fn new(config: PollConfig, fetcher: Arc<F>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                fetcher,
                registry: Mutex::new(SubscriptionRegistry::new()),
                callback: RwLock::new(None),
                hook: RwLock::new(None),
                stats: Mutex::new(PollStats::default()),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PollConfig {
        &self.inner.config
    }

    pub fn set_callback(&self, callback: UpdateCallback<F::Item>) {
        *self.inner.callback.write() = Some(callback);
    }

    pub fn set_persistence_hook(&self, hook: Arc<dyn PersistenceHook<F::Item>>) {
        *self.inner.hook.write() = Some(hook);
    }

    pub fn clear_persistence_hook(&self) {
        *self.inner.hook.write() = None;
    }

    pub fn has_persistence_hook(&self) -> bool {
        self.inner.hook.read().is_some()
    }

    /// Add `ids` to `owner`'s subscriptions, returning how many were new
    pub fn subscribe(&self, owner: &str, ids: impl IntoIterator<Item = F::Id>) -> usize {
        let added = self.inner.registry.lock().subscribe(owner, ids);
        tracing::debug!(
            engine = %self.inner.config.name,
            "Subscribed {} new item(s) for {}",
            added,
            owner
        );
        added
    }

    /// Remove `ids` from `owner`'s subscriptions, returning how many were removed
    pub fn unsubscribe(&self, owner: &str, ids: impl IntoIterator<Item = F::Id>) -> usize {
        let removed = self.inner.registry.lock().unsubscribe(owner, ids);
        tracing::debug!(
            engine = %self.inner.config.name,
            "Unsubscribed {} item(s) for {}",
            removed,
            owner
        );
        removed
    }

    pub fn unsubscribe_all(&self, owner: &str) -> bool {
        let existed = self.inner.registry.lock().unsubscribe_all(owner);
        if existed {
            tracing::debug!(engine = %self.inner.config.name, "Dropped all subscriptions for {}", owner);
        }
        existed
    }

    /// Subscribed IDs for `owner`
    pub fn subscriptions(&self, owner: &str) -> Vec<F::Id> {
        self.inner.registry.lock().ids_for(owner).unwrap_or_default()
    }

    pub fn subscribed_owners(&self) -> Vec<String> {
        self.inner.registry.lock().owners()
    }

    /// Read access to the registry, mostly for assertions
    pub fn with_registry<R>(&self, f: impl FnOnce(&SubscriptionRegistry<F::Id>) -> R) -> R {
        f(&self.inner.registry.lock())
    }

    /// Spawn the poll loop. A no-op if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!(engine = %self.inner.config.name, "Poll loop already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run_loop(Arc::clone(&self.inner), cancel.clone()));
        *task = Some(RunningTask { cancel, handle });
    }

    /// Cancel the poll loop and wait until it has exited
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        let Some(RunningTask { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(engine = %self.inner.config.name, "Poll loop terminated abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Run one regular cycle now and return what it emitted
    pub async fn poll_once(&self) -> Vec<Update<F::Item>> {
        let cancel = self.current_token();
        self.inner.run_cycle(false, &cancel).await
    }

    /// Emit every subscribed item regardless of its cached hash
    ///
    /// The cache is still refreshed, so the next regular cycle only reports
    /// values that changed after this call.
    pub async fn force_emit_all(&self) -> Vec<Update<F::Item>> {
        let cancel = self.current_token();
        self.inner.run_cycle(true, &cancel).await
    }

    /// Fetch `owner`'s items, split into batches when `ids` exceeds the batch size
    pub async fn fetch_batched(&self, owner: &str, ids: &[F::Id]) -> Result<Vec<F::Item>> {
        let cancel = self.current_token();
        self.inner.fetch_batched(owner, ids, &cancel).await
    }

    pub fn stats(&self) -> PollStats {
        let mut stats = self.inner.stats.lock().clone();
        let registry = self.inner.registry.lock();
        stats.owners = registry.owner_count();
        stats.items = registry.item_count();
        stats
    }

    fn current_token(&self) -> CancellationToken {
        self.task
            .lock()
            .as_ref()
            .map(|t| t.cancel.clone())
            .unwrap_or_else(CancellationToken::new)
    }

    async fn run_loop(inner: Arc<EngineInner<F>>, cancel: CancellationToken) {
        let span = tracing::info_span!("poll_engine", engine = %inner.config.name);

        async move {
            tracing::info!("Poll loop started (interval: {:?})", inner.config.interval);

            let mut ticker = tokio::time::interval(inner.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                inner.run_cycle(false, &cancel).await;
            }

            tracing::info!("Poll loop stopped");
        }
        .instrument(span)
        .await
    }
}

impl<F: ItemFetcher> Drop for PollEngine<F> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl<F: ItemFetcher> EngineInner<F> {
    async fn run_cycle(&self, force: bool, cancel: &CancellationToken) -> Vec<Update<F::Item>> {
        // Private copy so no lock is held during network I/O
        let snapshot = self.registry.lock().snapshot();

        let mut updates = Vec::new();
        let mut fetch_errors = 0u64;

        for (owner, ids) in snapshot {
            if cancel.is_cancelled() {
                break;
            }

            let items = match self.fetch_batched(&owner, &ids, cancel).await {
                Ok(items) => items,
                Err(PollError::AllBatchesFailed {
                    source: FetchError::Cancelled,
                    ..
                }) => break,
                Err(e) => {
                    tracing::warn!(engine = %self.config.name, "Skipping {} this cycle: {}", owner, e);
                    fetch_errors += 1;
                    continue;
                }
            };

            let observed: Vec<(F::Id, String, F::Item)> = items
                .into_iter()
                .map(|item| (self.fetcher.item_id(&item), self.fetcher.value_hash(&item), item))
                .collect();

            let now = Utc::now();
            let mut registry = self.registry.lock();
            for (id, hash, item) in observed {
                let emit = if force {
                    registry.store(&owner, &id, hash)
                } else {
                    registry.observe(&owner, &id, hash) == Observation::Changed
                };
                if emit {
                    updates.push(Update::new(owner.as_str(), item, now));
                }
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.cycles += 1;
            stats.fetch_errors += fetch_errors;
            stats.updates_emitted += updates.len() as u64;
            stats.last_cycle = Some(Utc::now());
        }

        if !updates.is_empty() {
            tracing::debug!(engine = %self.config.name, "Emitting {} update(s)", updates.len());
            self.dispatch(updates.clone());
        }

        updates
    }

    /// Hand the batch to the callback and, detached, to the persistence hook
    fn dispatch(&self, batch: Vec<Update<F::Item>>) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            let records = batch.clone();
            let name = self.config.name.clone();
            tokio::spawn(async move {
                if let Err(e) = hook.save_batch(records).await {
                    tracing::warn!(engine = %name, "Failed to persist batch: {}", e);
                }
            });
        }

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(batch);
        }
    }

    async fn fetch_batched(
        &self,
        owner: &str,
        ids: &[F::Id],
        cancel: &CancellationToken,
    ) -> Result<Vec<F::Item>> {
        let batch_size = self.config.batch_size;

        if batch_size == 0 || ids.len() <= batch_size {
            return self
                .fetch_one(owner, ids, cancel)
                .await
                .map_err(|source| PollError::AllBatchesFailed {
                    owner: owner.to_string(),
                    source,
                });
        }

        let mut items = Vec::with_capacity(ids.len());
        let mut succeeded = 0usize;
        let mut last_error = None;

        for chunk in ids.chunks(batch_size) {
            match self.fetch_one(owner, chunk, cancel).await {
                Ok(batch) => {
                    succeeded += 1;
                    items.extend(batch);
                }
                Err(FetchError::Cancelled) => {
                    return Err(PollError::AllBatchesFailed {
                        owner: owner.to_string(),
                        source: FetchError::Cancelled,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        engine = %self.config.name,
                        "Batch of {} item(s) failed for {}: {}",
                        chunk.len(),
                        owner,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) if succeeded == 0 => Err(PollError::AllBatchesFailed {
                owner: owner.to_string(),
                source,
            }),
            _ => Ok(items),
        }
    }

    async fn fetch_one(
        &self,
        owner: &str,
        ids: &[F::Id],
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<F::Item>, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetcher.fetch_items(owner, ids) => result,
        }
    }
}
