//! The engine facade wiring every component together.

use crate::cache::{CacheEntry, CachedData, EncryptedCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, RetryConfig};
use crate::conflict::ConflictResolver;
use crate::connectivity::ConnectivityMonitor;
use crate::crypto::CryptoProvider;
use crate::dead_letter::DeadLetterStore;
use crate::driver::{self, PlatformEvent};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SubscriptionId, SyncEvent, Topic};
use crate::model::{
    base_version_of, DeadLetterItem, Operation, Payload, Priority, SyncQueueItem, SyncState,
};
use crate::processor::{SyncProcessor, SyncReport, SyncStats};
use crate::queue::SyncQueueStore;
use crate::remote::RemoteDataStore;
use crate::{CollectionName, ItemId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synq_storage::KeyValueStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Builder for [`SyncEngine`].
///
/// Only the durable store and the remote store are required; everything
/// else has a default (server-wins conflicts, no encryption, system clock,
/// a private event bus).
pub struct EngineBuilder {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteDataStore>,
    config: EngineConfig,
    crypto: Option<Arc<dyn CryptoProvider>>,
    resolver: Option<Arc<dyn ConflictResolver>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<EventBus>>,
}

impl EngineBuilder {
    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables cache encryption through `crypto`.
    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Replaces the default server-wins resolver.
    pub fn resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replaces the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Publishes on a shared event bus instead of a private one.
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the engine and loads persisted state.
    ///
    /// Loading purges expired queue items and restores the dead-letter
    /// archive and last-sync timestamp. Unreadable state is logged and
    /// treated as empty.
    pub fn build(self) -> SyncEngine {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let events = self.events.unwrap_or_default();
        let config = self.config;

        let connectivity = Arc::new(ConnectivityMonitor::new(
            config.initial_online,
            Arc::clone(&events),
        ));
        let dead_letter = Arc::new(DeadLetterStore::new(
            Arc::clone(&self.store),
            Arc::clone(&events),
            Arc::clone(&clock),
            config.max_dead_letter_size,
        ));
        let queue = Arc::new(SyncQueueStore::new(
            Arc::clone(&self.store),
            Arc::clone(&dead_letter),
            Arc::clone(&events),
            Arc::clone(&clock),
            &config,
        ));
        let cache = EncryptedCache::new(Arc::clone(&self.store), self.crypto, Arc::clone(&clock));

        let mut processor = SyncProcessor::new(
            config.clone(),
            Arc::clone(&queue),
            self.remote,
            Arc::clone(&connectivity),
            Arc::clone(&events),
            Arc::clone(&self.store),
            Arc::clone(&clock),
        );
        if let Some(resolver) = self.resolver {
            processor = processor.with_resolver(resolver);
        }

        dead_letter.load();
        let purged = queue.load();
        processor.load();
        tracing::info!(
            pending = queue.len(),
            dead_lettered = dead_letter.len(),
            purged,
            "sync engine initialised"
        );

        SyncEngine {
            inner: Arc::new(EngineInner {
                config,
                store: self.store,
                clock,
                events,
                connectivity,
                queue,
                dead_letter,
                cache,
                processor,
                disposed: AtomicBool::new(false),
                driver: Mutex::new(None),
            }),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Arc<SyncQueueStore>,
    dead_letter: Arc<DeadLetterStore>,
    cache: EncryptedCache,
    processor: SyncProcessor,
    disposed: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Offline-first sync engine.
///
/// Mutations are queued durably with [`queue_change`](Self::queue_change)
/// and drained to the remote store whenever the client is online. Clones
/// share the same engine.
///
/// ```rust,ignore
/// let engine = SyncEngine::builder(store, remote)
///     .crypto(Arc::new(AesGcmProvider::new(key)))
///     .build();
///
/// engine.queue_change("members", Operation::Insert, payload, Priority::High)?;
/// let report = engine.force_sync().await?;
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts building an engine over a durable store and a remote store.
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteDataStore>,
    ) -> EngineBuilder {
        EngineBuilder {
            store,
            remote,
            config: EngineConfig::default(),
            crypto: None,
            resolver: None,
            clock: None,
            events: None,
        }
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Queues a mutation and returns its id.
    ///
    /// Updates and deletes must carry the identifying key field. When
    /// online, idle and `auto_sync` is set, a drain pass is started in the
    /// background on the current tokio runtime.
    pub fn queue_change(
        &self,
        collection: impl Into<CollectionName>,
        operation: Operation,
        payload: Payload,
        priority: Priority,
    ) -> SyncResult<ItemId> {
        self.ensure_active()?;
        let config = &self.inner.config;

        let base_version = base_version_of(&payload, &config.version_field);
        let item = SyncQueueItem::new(collection, operation, payload, priority, self.now())
            .with_base_version(base_version);

        if operation.requires_key() && item.record_key(&config.key_field).is_none() {
            return Err(SyncError::invalid_payload(format!(
                "{operation} requires field '{}'",
                config.key_field
            )));
        }

        let id = item.id.clone();
        self.inner.queue.enqueue(item);

        if config.auto_sync && self.is_online() && !self.inner.processor.is_in_progress() {
            self.spawn_drain();
        }
        Ok(id)
    }

    /// Runs one drain pass now.
    ///
    /// Returns `None` if offline, already draining, disposed, or nothing is
    /// queued.
    pub async fn process_queue(&self) -> Option<SyncReport> {
        if self.is_disposed() {
            return None;
        }
        self.inner.processor.process_queue().await
    }

    /// Runs a drain pass, failing if the client is offline.
    pub async fn force_sync(&self) -> SyncResult<Option<SyncReport>> {
        self.ensure_active()?;
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        Ok(self.process_queue().await)
    }

    /// Current sync status.
    pub fn sync_state(&self) -> SyncState {
        let processor = &self.inner.processor;
        SyncState {
            last_sync_timestamp: processor.last_sync_timestamp(),
            pending_changes: self.inner.queue.len(),
            sync_in_progress: processor.is_in_progress(),
            conflicts_resolved: processor.conflicts_resolved(),
        }
    }

    /// Cumulative processing counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.processor.stats()
    }

    /// Queued items in processing order.
    pub fn pending_items(&self) -> Vec<SyncQueueItem> {
        self.inner.queue.snapshot()
    }

    /// Caches `value` under `key`, encrypted when possible.
    pub async fn cache_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SyncResult<()> {
        self.ensure_active()?;
        self.inner.cache.put(key, value).await
    }

    /// Reads a cached value.
    pub async fn cached_data<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        self.inner.cache.get(key).await
    }

    /// Raw cache entry, as persisted.
    pub fn cache_entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.cache.entry(key)
    }

    /// Every readable cache entry.
    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        self.inner.cache.entries()
    }

    /// Removes every cache entry. Returns the number removed.
    pub fn clear_cache(&self) -> SyncResult<usize> {
        self.ensure_active()?;
        Ok(self.inner.cache.clear())
    }

    /// Archived items, oldest first.
    pub fn dead_letter_queue(&self) -> Vec<DeadLetterItem> {
        self.inner.dead_letter.list()
    }

    /// Moves archived items back into the queue with their retry counters reset.
    ///
    /// With `None` every archived item is retried. Returns the number of
    /// items re-queued.
    pub fn retry_dead_letter(&self, ids: Option<&[ItemId]>) -> SyncResult<usize> {
        self.ensure_active()?;
        let items = self.inner.dead_letter.take(ids);
        Ok(self.inner.queue.restore(items))
    }

    /// Returns the last reported connectivity.
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Reports a connectivity change.
    ///
    /// Going online starts a drain pass; going offline cancels the running
    /// one. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.apply_connectivity(online);
        if changed && online {
            self.spawn_drain();
        }
        changed
    }

    /// Handles a single platform event.
    pub fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::ConnectivityChanged { online } => {
                self.set_online(online);
            }
            PlatformEvent::SyncRequested => self.spawn_drain(),
        }
    }

    /// Consumes platform events on a background task, retrying passes that
    /// left failures behind according to `retry`.
    ///
    /// Replaces any previously attached receiver. Must be called from within
    /// a tokio runtime.
    pub fn attach_platform_events(
        &self,
        receiver: mpsc::Receiver<PlatformEvent>,
        retry: RetryConfig,
    ) -> SyncResult<()> {
        self.ensure_active()?;
        let handle = tokio::spawn(driver::run(self.clone(), receiver, retry));
        if let Some(previous) = self.inner.driver.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Registers an event listener.
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(topic, listener)
    }

    /// Removes an event listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Shuts the engine down.
    ///
    /// Cancels the running pass, detaches the platform driver and every
    /// listener, and flushes the store. Later mutating calls fail with
    /// [`SyncError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.processor.cancel();
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        self.inner.events.clear();
        if let Err(e) = self.inner.store.save() {
            tracing::error!(error = %e, "failed to flush store on dispose");
        }
        tracing::info!("sync engine disposed");
    }

    /// Returns true once [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Updates connectivity and cancels on loss. Returns true on transition.
    pub(crate) fn apply_connectivity(&self, online: bool) -> bool {
        if self.is_disposed() {
            return false;
        }
        let changed = self.inner.connectivity.set_online(online);
        if changed && !online {
            self.inner.processor.cancel();
        }
        changed
    }

    fn spawn_drain(&self) {
        if self.is_disposed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let engine = self.clone();
                runtime.spawn(async move {
                    engine.process_queue().await;
                });
            }
            Err(_) => tracing::debug!("no tokio runtime, drain deferred"),
        }
    }

    fn ensure_active(&self) -> SyncResult<()> {
        if self.is_disposed() {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }

    fn now(&self) -> crate::Timestamp {
        self.inner.clock.now_millis()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.sync_state())
            .field("online", &self.is_online())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote::{RemoteResult, RemoteRow};
    use async_trait::async_trait;
    use serde_json::json;
    use synq_storage::InMemoryStore;

    struct AcceptAll;

    #[async_trait]
    impl RemoteDataStore for AcceptAll {
        async fn apply_insert(&self, _collection: &str, _data: &Payload) -> RemoteResult<()> {
            Ok(())
        }

        async fn apply_delete(&self, _collection: &str, _key: &str) -> RemoteResult<()> {
            Ok(())
        }

        async fn read_current(&self, _collection: &str, _key: &str) -> RemoteResult<Option<RemoteRow>> {
            Ok(Some(RemoteRow::at_version(1)))
        }

        async fn apply_update(&self, _collection: &str, _key: &str, _data: &Payload) -> RemoteResult<()> {
            Ok(())
        }
    }

    fn engine(online: bool) -> SyncEngine {
        SyncEngine::builder(Arc::new(InMemoryStore::new()), Arc::new(AcceptAll))
            .config(
                EngineConfig::new()
                    .with_initial_online(online)
                    .with_auto_sync(false),
            )
            .clock(Arc::new(ManualClock::new(1_000)))
            .build()
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn queue_change_reads_base_version() {
        let engine = engine(false);
        let id = engine
            .queue_change(
                "members",
                Operation::Update,
                payload(json!({"id": "m1", "version": 3})),
                Priority::High,
            )
            .unwrap();

        let items = engine.pending_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].base_version, 3);
        assert_eq!(items[0].enqueued_at, 1_000);
        assert_eq!(engine.sync_state().pending_changes, 1);
    }

    #[test]
    fn custom_version_field() {
        let engine = SyncEngine::builder(Arc::new(InMemoryStore::new()), Arc::new(AcceptAll))
            .config(
                EngineConfig::new()
                    .with_version_field("rev")
                    .with_auto_sync(false),
            )
            .build();
        engine
            .queue_change(
                "members",
                Operation::Update,
                payload(json!({"id": "m1", "rev": 9})),
                Priority::Normal,
            )
            .unwrap();
        assert_eq!(engine.pending_items()[0].base_version, 9);
    }

    #[test]
    fn update_without_key_is_rejected() {
        let engine = engine(false);
        let err = engine
            .queue_change(
                "members",
                Operation::Delete,
                payload(json!({"name": "Ana"})),
                Priority::Normal,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        assert_eq!(engine.sync_state().pending_changes, 0);

        // Inserts need no key.
        assert!(engine
            .queue_change("members", Operation::Insert, Payload::new(), Priority::Low)
            .is_ok());
    }

    #[tokio::test]
    async fn force_sync_offline_fails() {
        let engine = engine(false);
        assert!(matches!(engine.force_sync().await, Err(SyncError::Offline)));
        assert!(engine.process_queue().await.is_none());
    }

    #[tokio::test]
    async fn force_sync_drains() {
        let engine = engine(true);
        engine
            .queue_change("members", Operation::Insert, Payload::new(), Priority::Normal)
            .unwrap();

        let report = engine.force_sync().await.unwrap().unwrap();
        assert_eq!(report.processed, 1);
        let state = engine.sync_state();
        assert_eq!(state.pending_changes, 0);
        assert_eq!(state.last_sync_timestamp, Some(1_000));
        assert!(!state.sync_in_progress);
    }

    #[tokio::test]
    async fn dispose_rejects_mutations() {
        let engine = engine(true);
        engine.subscribe(Topic::QueueUpdated, |_| {});
        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert!(matches!(
            engine.queue_change("t", Operation::Insert, Payload::new(), Priority::Normal),
            Err(SyncError::Disposed)
        ));
        assert!(matches!(engine.force_sync().await, Err(SyncError::Disposed)));
        assert!(matches!(
            engine.cache_data("k", &1).await,
            Err(SyncError::Disposed)
        ));
        assert!(matches!(engine.retry_dead_letter(None), Err(SyncError::Disposed)));
        assert!(!engine.set_online(false));
    }

    #[test]
    fn set_online_reports_transitions() {
        let engine = engine(true);
        assert!(!engine.set_online(true));
        assert!(engine.set_online(false));
        assert!(!engine.is_online());
        // No runtime: going online only records the state.
        assert!(engine.set_online(true));
        assert!(engine.is_online());
    }
}
