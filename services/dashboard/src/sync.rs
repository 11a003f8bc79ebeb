//! Device message sync session.
//!
//! Maintains a live, bounded, ordered view of one device channel and
//! surfaces connection health. The remote store pushes batches of raw
//! records; each batch is merged into the buffer by store insertion order
//! (push-key order, never arrival wall-clock), the oldest records are
//! evicted once the buffer exceeds its limit, and the whole raw buffer is
//! re-run through the currently selected processor so the normalized view
//! stays index-aligned with it.
//!
//! Every subscription attempt gets a fresh epoch. Buffer mutation is gated
//! on the epoch still being current while the state lock is held, so a late
//! update from a torn-down or refreshed subscription is discarded
//! structurally rather than by convention.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use processors::{MessageProcessor, ProcessorRegistry};
use store::DeviceStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use types::{ConnectionState, DeviceId, MessageTab, ProcessedEntry, RawMessage};

use crate::error::{DashboardError, Result};

/// Construction inputs for one sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub device: DeviceId,
    pub tab: MessageTab,
    /// Bound on the raw buffer; oldest records evicted first. Positive.
    pub data_limit: usize,
    /// Explicit processor id, or `None` for the registry default.
    pub processor_id: Option<String>,
}

/// Point-in-time view of a sync session, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    /// Raw records in store insertion order, newest last.
    pub raw: Vec<RawMessage>,
    /// Normalized entries, index-aligned with `raw`; rejections held in
    /// place rather than dropped.
    pub entries: Vec<ProcessedEntry>,
    pub connection: ConnectionState,
    /// True until the first batch (or a subscription failure) arrives.
    pub loading: bool,
    /// Set only by subscription failure; per-record rejections are entries.
    pub error: Option<String>,
}

struct SessionState {
    raw: Vec<RawMessage>,
    entries: Vec<ProcessedEntry>,
    processor: Arc<dyn MessageProcessor>,
    connection: ConnectionState,
    loading: bool,
    error: Option<String>,
}

struct Shared {
    state: RwLock<SessionState>,
    /// Identity of the current subscription attempt; bumped by every
    /// resubscribe and by teardown.
    epoch: AtomicU64,
    stopped: AtomicBool,
    publisher: watch::Sender<SyncSnapshot>,
}

impl Shared {
    fn snapshot(&self) -> SyncSnapshot {
        let st = self.state.read();
        SyncSnapshot {
            raw: st.raw.clone(),
            entries: st.entries.clone(),
            connection: st.connection,
            loading: st.loading,
            error: st.error.clone(),
        }
    }

    fn publish(&self) {
        // Consumers may come and go; a send with no receivers is fine.
        let _ = self.publisher.send(self.snapshot());
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Merge one batch. Returns false when the owning subscription is no
    /// longer current, telling its task to exit without mutating anything.
    fn apply_batch(&self, epoch: u64, batch: Vec<RawMessage>, limit: usize) -> bool {
        {
            let mut st = self.state.write();
            if !self.is_current(epoch) {
                debug!("discarding batch from stale subscription");
                return false;
            }
            st.loading = false;
            for record in batch {
                merge_record(&mut st.raw, record);
            }
            while st.raw.len() > limit {
                st.raw.remove(0);
            }
            let processor = st.processor.clone();
            st.entries = normalize_all(processor.as_ref(), &st.raw);
        }
        self.publish();
        true
    }

    fn set_error(&self, epoch: u64, message: String) {
        {
            let mut st = self.state.write();
            if !self.is_current(epoch) {
                return;
            }
            st.loading = false;
            st.error = Some(message);
        }
        self.publish();
    }

    fn set_connection(&self, connection: ConnectionState) {
        {
            let mut st = self.state.write();
            if self.stopped.load(Ordering::SeqCst) || st.connection == connection {
                return;
            }
            st.connection = connection;
        }
        self.publish();
    }
}

/// Insert in push-key order, replacing an existing record with the same key.
fn merge_record(raw: &mut Vec<RawMessage>, record: RawMessage) {
    match raw.binary_search_by(|existing| existing.key.cmp(&record.key)) {
        Ok(i) => raw[i] = record,
        Err(i) => raw.insert(i, record),
    }
}

fn normalize_all(processor: &dyn MessageProcessor, raw: &[RawMessage]) -> Vec<ProcessedEntry> {
    raw.iter()
        .map(|record| match processor.process(record) {
            Ok(msg) => ProcessedEntry::Normalized(msg),
            Err(rejection) => ProcessedEntry::Rejected(rejection),
        })
        .collect()
}

/// Live sync session for one (device, tab, processor) tuple.
///
/// Owns its buffer exclusively; the subscription task is the only writer.
/// Dropping the session releases the subscription.
pub struct DeviceMessageSync {
    store: Arc<dyn DeviceStore>,
    registry: Arc<ProcessorRegistry>,
    device: DeviceId,
    tab: MessageTab,
    data_limit: usize,
    shared: Arc<Shared>,
    message_task: Mutex<Option<JoinHandle<()>>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMessageSync {
    /// Activate a session: open the store subscription and the connection
    /// watch, with `loading = true` until data arrives.
    pub fn start(
        store: Arc<dyn DeviceStore>,
        registry: Arc<ProcessorRegistry>,
        config: SyncConfig,
    ) -> Result<Self> {
        if config.data_limit == 0 {
            return Err(DashboardError::configuration("data_limit must be positive"));
        }

        let processor = registry.resolve(config.processor_id.as_deref());
        let initial = SyncSnapshot {
            raw: Vec::new(),
            entries: Vec::new(),
            connection: ConnectionState::Unknown,
            loading: true,
            error: None,
        };
        let (publisher, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            state: RwLock::new(SessionState {
                raw: Vec::new(),
                entries: Vec::new(),
                processor,
                connection: ConnectionState::Unknown,
                loading: true,
                error: None,
            }),
            epoch: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            publisher,
        });

        let sync = Self {
            store,
            registry,
            device: config.device,
            tab: config.tab,
            data_limit: config.data_limit,
            shared,
            message_task: Mutex::new(None),
            connection_task: Mutex::new(None),
        };
        sync.spawn_connection_watch();
        sync.resubscribe();
        Ok(sync)
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn tab(&self) -> MessageTab {
        self.tab
    }

    /// Id of the currently selected processor.
    pub fn processor_id(&self) -> &'static str {
        self.shared.state.read().processor.id()
    }

    /// Current view of the session.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.shared.snapshot()
    }

    /// Watch channel publishing every snapshot change.
    pub fn watch_updates(&self) -> watch::Receiver<SyncSnapshot> {
        self.publisher().subscribe()
    }

    fn publisher(&self) -> &watch::Sender<SyncSnapshot> {
        &self.shared.publisher
    }

    /// Swap the selected processor and recompute the normalized buffer from
    /// the raw buffer already in memory. Never touches the subscription.
    pub fn set_processor(&self, processor_id: Option<&str>) {
        let processor = self.registry.resolve(processor_id);
        {
            let mut st = self.shared.state.write();
            let entries = normalize_all(processor.as_ref(), &st.raw);
            st.processor = processor;
            st.entries = entries;
        }
        self.shared.publish();
    }

    /// Tear down the current subscription and open a fresh one.
    ///
    /// Clears `error` optimistically before the new attempt resolves. Safe
    /// to call while a subscription is live: the prior one is cancelled
    /// first, so two subscriptions for the same tuple are never concurrently
    /// live.
    pub fn refresh(&self) {
        {
            let mut st = self.shared.state.write();
            st.error = None;
            st.loading = true;
        }
        self.shared.publish();
        self.resubscribe();
    }

    /// Release the subscription. No buffer mutation can occur afterward.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.message_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.connection_task.lock().take() {
            handle.abort();
        }
    }

    fn resubscribe(&self) {
        let mut slot = self.message_task.lock();

        // The epoch is assigned under the task-slot lock so interleaved
        // refreshes cannot abort a newer task and replace it with one
        // carrying an already-stale epoch. Bumping it invalidates the prior
        // subscription even before its task observes the abort.
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let store = self.store.clone();
        let shared = self.shared.clone();
        let device = self.device.clone();
        let tab = self.tab;
        let limit = self.data_limit;

        *slot = Some(tokio::spawn(async move {
            match store.subscribe_messages(&device, tab).await {
                Ok(mut subscription) => {
                    debug!(
                        subscription = %subscription.id(),
                        device = %device,
                        tab = %tab,
                        "sync subscription established"
                    );
                    while let Some(batch) = subscription.next_batch().await {
                        if !shared.apply_batch(epoch, batch, limit) {
                            return;
                        }
                    }
                    // The store closed the stream underneath us.
                    warn!(device = %device, tab = %tab, "sync subscription dropped by store");
                    shared.set_error(epoch, "subscription dropped by store".to_string());
                }
                Err(e) => {
                    warn!(device = %device, tab = %tab, error = %e, "sync subscription failed");
                    shared.set_error(epoch, e.to_string());
                }
            }
        }));
    }

    fn spawn_connection_watch(&self) {
        let shared = self.shared.clone();
        let mut rx = self.store.watch_connection();
        *self.connection_task.lock() = Some(tokio::spawn(async move {
            loop {
                let state = *rx.borrow_and_update();
                shared.set_connection(state);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }));
    }
}

impl Drop for DeviceMessageSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::time::Duration;
    use store::MemoryStore;

    fn sms_fields(body: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("body".to_string(), json!(body));
        map.insert("phone".to_string(), json!("+15550001111"));
        map.insert("timestamp".to_string(), json!(1_700_000_000_000_i64));
        map
    }

    fn device() -> DeviceId {
        DeviceId::new("unit-1").unwrap()
    }

    fn config(limit: usize) -> SyncConfig {
        SyncConfig {
            device: device(),
            tab: MessageTab::Sms,
            data_limit: limit,
            processor_id: None,
        }
    }

    fn start(store: &MemoryStore, limit: usize) -> DeviceMessageSync {
        DeviceMessageSync::start(
            Arc::new(store.clone()),
            Arc::new(ProcessorRegistry::with_builtin().unwrap()),
            config(limit),
        )
        .unwrap()
    }

    async fn wait_for(
        sync: &DeviceMessageSync,
        pred: impl Fn(&SyncSnapshot) -> bool,
    ) -> SyncSnapshot {
        for _ in 0..400 {
            let snap = sync.snapshot();
            if pred(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached; last snapshot: {:?}", sync.snapshot());
    }

    #[tokio::test]
    async fn test_backlog_load_clears_loading() {
        let store = MemoryStore::default();
        store.push_record(&device(), MessageTab::Sms, sms_fields("one"));
        store.push_record(&device(), MessageTab::Sms, sms_fields("two"));

        let sync = start(&store, 10);
        assert!(sync.snapshot().loading);

        let snap = wait_for(&sync, |s| !s.loading).await;
        assert_eq!(snap.raw.len(), 2);
        assert_eq!(snap.entries.len(), 2);
        assert!(snap.error.is_none());
        assert!(snap.raw[0].key < snap.raw[1].key);
    }

    #[tokio::test]
    async fn test_fifo_eviction_by_store_order() {
        let store = MemoryStore::default();
        let sync = start(&store, 3);
        wait_for(&sync, |s| !s.loading).await;

        let first = store.push_record(&device(), MessageTab::Sms, sms_fields("m1"));
        store.push_record(&device(), MessageTab::Sms, sms_fields("m2"));
        store.push_record(&device(), MessageTab::Sms, sms_fields("m3"));
        let snap = wait_for(&sync, |s| s.raw.len() == 3).await;
        assert_eq!(snap.raw[0].key, first.key);

        // One more record evicts exactly the oldest, leaving size == limit.
        store.push_record(&device(), MessageTab::Sms, sms_fields("m4"));
        let snap = wait_for(&sync, |s| s.raw.iter().all(|r| r.key != first.key)).await;
        assert_eq!(snap.raw.len(), 3);
        assert!(snap.raw.windows(2).all(|w| w[0].key < w[1].key));
        assert_eq!(snap.entries.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_records_stay_index_aligned() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);

        store.push_record(&device(), MessageTab::Sms, sms_fields("good"));
        let mut bad = Map::new();
        bad.insert("garbage".to_string(), json!(42));
        store.push_record(&device(), MessageTab::Sms, bad);

        let snap = wait_for(&sync, |s| s.entries.len() == 2).await;
        assert!(!snap.entries[0].is_rejected());
        assert!(snap.entries[1].is_rejected());
        // Rejection is not a session error.
        assert!(snap.error.is_none());
        assert_eq!(snap.entries[1].source_key(), snap.raw[1].key);
    }

    #[tokio::test]
    async fn test_set_processor_recomputes_without_resubscribing() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);
        store.push_record(&device(), MessageTab::Sms, sms_fields("hello"));
        wait_for(&sync, |s| s.entries.len() == 1).await;
        assert_eq!(store.subscriber_count(&device(), MessageTab::Sms), 1);

        sync.set_processor(Some("raw-json"));
        let snap = sync.snapshot();
        assert_eq!(sync.processor_id(), "raw-json");
        match &snap.entries[0] {
            ProcessedEntry::Normalized(msg) => {
                assert_eq!(msg.kind, types::MessageKind::Unknown);
                assert!(msg.body.contains("hello"));
            }
            other => panic!("expected normalized entry, got {:?}", other),
        }

        // Same subscription, no re-fetch.
        assert_eq!(store.subscriber_count(&device(), MessageTab::Sms), 1);
    }

    #[tokio::test]
    async fn test_normalization_is_deterministic() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);
        store.push_record(&device(), MessageTab::Sms, sms_fields("same"));
        let before = wait_for(&sync, |s| s.entries.len() == 1).await;

        sync.set_processor(Some("sms"));
        let after = sync.snapshot();
        assert_eq!(before.entries, after.entries);
    }

    #[tokio::test]
    async fn test_subscription_failure_sets_error_and_refresh_recovers() {
        let store = MemoryStore::default();
        store.fail_subscriptions(true);
        let sync = start(&store, 10);

        let snap = wait_for(&sync, |s| s.error.is_some()).await;
        assert!(!snap.loading);

        store.fail_subscriptions(false);
        store.push_record(&device(), MessageTab::Sms, sms_fields("recovered"));
        sync.refresh();
        // Error cleared optimistically before the new attempt resolves.
        assert!(sync.snapshot().error.is_none());

        let snap = wait_for(&sync, |s| !s.loading && s.raw.len() == 1).await;
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_refresh_never_leaves_two_live_subscriptions() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);
        wait_for(&sync, |s| !s.loading).await;

        sync.refresh();
        sync.refresh();
        wait_for(&sync, |s| !s.loading).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.subscriber_count(&device(), MessageTab::Sms), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_refreshes_settle_on_a_live_subscription() {
        let store = MemoryStore::default();
        let sync = Arc::new(start(&store, 10));
        wait_for(&sync, |s| !s.loading).await;

        // Refreshes landing from several threads at once must not leave the
        // last-spawned task holding a stale epoch.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sync = sync.clone();
            handles.push(tokio::spawn(async move { sync.refresh() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = wait_for(&sync, |s| !s.loading).await;
        assert!(snap.error.is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.subscriber_count(&device(), MessageTab::Sms), 1);

        // The surviving subscription is live, not a zombie.
        store.push_record(&device(), MessageTab::Sms, sms_fields("still here"));
        wait_for(&sync, |s| s.raw.len() == 1).await;
    }

    #[tokio::test]
    async fn test_late_update_after_stop_is_discarded() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);
        store.push_record(&device(), MessageTab::Sms, sms_fields("before"));
        wait_for(&sync, |s| s.raw.len() == 1).await;

        sync.stop();
        store.push_record(&device(), MessageTab::Sms, sms_fields("after"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let snap = sync.snapshot();
        assert_eq!(snap.raw.len(), 1);
        assert_eq!(snap.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_state_follows_store_signal() {
        let store = MemoryStore::default();
        let sync = start(&store, 10);
        assert_eq!(sync.snapshot().connection, ConnectionState::Unknown);

        store.set_connection(ConnectionState::Connected);
        wait_for(&sync, |s| s.connection == ConnectionState::Connected).await;

        store.set_connection(ConnectionState::Disconnected);
        wait_for(&sync, |s| s.connection == ConnectionState::Disconnected).await;
    }

    #[tokio::test]
    async fn test_zero_data_limit_rejected() {
        let store = MemoryStore::default();
        let result = DeviceMessageSync::start(
            Arc::new(store),
            Arc::new(ProcessorRegistry::with_builtin().unwrap()),
            config(0),
        );
        assert!(result.is_err());
    }
}
