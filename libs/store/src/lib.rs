//! Remote store seam.
//!
//! The realtime key-value store that devices report through is an external
//! collaborator; this crate defines the narrow async interface the dashboard
//! core consumes (ordered message subscriptions, the store's own connectivity
//! signal, and single-slot command writes) plus an in-process implementation
//! used by tests and the demo binary.
//!
//! Store layout:
//! - read side: `{root}/{device_id}/messages/{tab}/{push_key}`, ordered
//!   appendable records per device and channel;
//! - write side: `{root}/{device_id}/commands/{command_name}`, a single
//!   scalar overwritten on each dispatch.

pub mod error;
pub mod memory;
pub mod paths;
pub mod subscription;

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::watch;
use types::{ConnectionState, DeviceId, MessageTab};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use subscription::MessageSubscription;

/// Async interface to the remote device store.
#[async_trait]
pub trait DeviceStore: Send + Sync + Debug {
    /// Open a live subscription to one device channel.
    ///
    /// Records arrive in batches, in the store's insertion order, with the
    /// current backlog delivered first. Dropping the returned handle cancels
    /// delivery.
    async fn subscribe_messages(
        &self,
        device: &DeviceId,
        tab: MessageTab,
    ) -> Result<MessageSubscription, StoreError>;

    /// The store's own connectivity signal. Starts at `Unknown` until the
    /// transport resolves; never inferred from message arrival.
    fn watch_connection(&self) -> watch::Receiver<ConnectionState>;

    /// Overwrite one command slot with its wire representation.
    ///
    /// Exactly one slot write per call; the device firmware reads the slot on
    /// its own schedule.
    async fn write_command(
        &self,
        device: &DeviceId,
        command: &str,
        wire_value: &str,
    ) -> Result<(), StoreError>;
}
