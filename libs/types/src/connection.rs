//! Remote store connectivity signal.

use serde::{Deserialize, Serialize};

/// Connection state of the remote store, as reported by the store itself.
///
/// Derived from the store's own connectivity signal, never inferred from
/// message arrival. `Unknown` means the signal has not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Unknown
    }
}

impl ConnectionState {
    /// Check if the store link is live.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if the signal has resolved to a definite state.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ConnectionState::Unknown)
    }
}
