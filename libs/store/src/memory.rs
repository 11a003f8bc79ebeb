//! In-process device store.
//!
//! Backs the test suite and the demo binary with the same contract the real
//! realtime store exposes: per-channel ordered logs with push-key insertion
//! order, an initial backlog batch on subscribe, a connectivity signal, and
//! single-slot command writes. Failure injection and write delays let tests
//! exercise the core's retry and busy-guard behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use types::{ConnectionState, DeviceId, MessageTab, RawMessage};

use crate::error::StoreError;
use crate::paths::command_path;
use crate::subscription::MessageSubscription;
use crate::DeviceStore;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 64;

type ChannelKey = (DeviceId, MessageTab);

#[derive(Debug, Default)]
struct Inner {
    logs: Mutex<HashMap<ChannelKey, Vec<RawMessage>>>,
    subscribers: Mutex<HashMap<ChannelKey, Vec<mpsc::Sender<Vec<RawMessage>>>>>,
    commands: Mutex<HashMap<String, String>>,
    push_counter: AtomicU64,
    command_writes: AtomicU64,
    fail_subscriptions: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

/// In-memory [`DeviceStore`] implementation.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: String,
    connection: watch::Sender<ConnectionState>,
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("devices")
    }
}

impl MemoryStore {
    pub fn new(root: impl Into<String>) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Unknown);
        Self {
            root: root.into(),
            connection,
            inner: Arc::new(Inner::default()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Append a record to one device channel and fan it out to live
    /// subscribers. Returns the stored record with its generated push key.
    pub fn push_record(
        &self,
        device: &DeviceId,
        tab: MessageTab,
        fields: Map<String, Value>,
    ) -> RawMessage {
        let raw = RawMessage::new(self.next_push_key(), fields);
        let key = (device.clone(), tab);

        self.inner
            .logs
            .lock()
            .entry(key.clone())
            .or_default()
            .push(raw.clone());

        let mut subscribers = self.inner.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(&key) {
            // try_send keeps the push path non-blocking; a closed receiver is
            // a cancelled subscription and gets pruned.
            senders.retain(|sender| match sender.try_send(vec![raw.clone()]) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }

        raw
    }

    /// Flip the store's connectivity signal.
    pub fn set_connection(&self, state: ConnectionState) {
        // send_replace keeps working with no receivers attached yet.
        self.connection.send_replace(state);
    }

    /// Current value of one command slot, if ever written.
    pub fn command_value(&self, device: &DeviceId, command: &str) -> Option<String> {
        self.inner
            .commands
            .lock()
            .get(&command_path(&self.root, device, command))
            .cloned()
    }

    /// Total successful command writes.
    pub fn command_write_count(&self) -> u64 {
        self.inner.command_writes.load(Ordering::SeqCst)
    }

    /// Number of live (non-cancelled) subscriptions on one channel.
    pub fn subscriber_count(&self, device: &DeviceId, tab: MessageTab) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        match subscribers.get_mut(&(device.clone(), tab)) {
            Some(senders) => {
                senders.retain(|sender| !sender.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    /// Make subsequent `subscribe_messages` calls fail.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.inner.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `write_command` calls fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay command writes, to hold a dispatch in flight during tests.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.inner.write_delay.lock() = delay;
    }

    fn next_push_key(&self) -> String {
        // Zero-padded counter: lexicographic order == insertion order, the
        // same property the real store's push ids carry.
        let n = self.inner.push_counter.fetch_add(1, Ordering::SeqCst);
        format!("{:010}", n)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn subscribe_messages(
        &self,
        device: &DeviceId,
        tab: MessageTab,
    ) -> Result<MessageSubscription, StoreError> {
        if self.inner.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(StoreError::subscription(format!(
                "store refused subscription for {}/{}",
                device, tab
            )));
        }

        let key = (device.clone(), tab);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);

        // Backlog first, then live updates; an empty backlog still counts as
        // the subscription resolving.
        let backlog = self
            .inner
            .logs
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_default();
        let _ = tx.send(backlog).await;

        self.inner.subscribers.lock().entry(key).or_default().push(tx);

        let subscription = MessageSubscription::new(rx);
        debug!(
            subscription = %subscription.id(),
            device = %device,
            tab = %tab,
            "opened message subscription"
        );
        Ok(subscription)
    }

    fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    async fn write_command(
        &self,
        device: &DeviceId,
        command: &str,
        wire_value: &str,
    ) -> Result<(), StoreError> {
        let delay = *self.inner.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write(format!(
                "store rejected write to {}",
                command_path(&self.root, device, command)
            )));
        }

        let path = command_path(&self.root, device, command);
        self.inner
            .commands
            .lock()
            .insert(path.clone(), wire_value.to_string());
        self.inner.command_writes.fetch_add(1, Ordering::SeqCst);
        debug!(path = %path, value = %wire_value, "command slot written");
        Ok(())
    }
}
