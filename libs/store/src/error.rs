//! Error types for store operations.

use thiserror::Error;

/// Errors surfaced by the remote store transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A subscription failed to establish or was dropped by the store.
    #[error("subscription failed: {message}")]
    Subscription { message: String },

    /// A command write failed at the store layer.
    #[error("command write failed: {message}")]
    Write { message: String },
}

impl StoreError {
    pub fn subscription(message: impl Into<String>) -> Self {
        StoreError::Subscription {
            message: message.into(),
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        StoreError::Write {
            message: message.into(),
        }
    }

    /// Subscription failures recover via an explicit refresh; write failures
    /// recover by the caller retrying the dispatch.
    pub fn is_recoverable(&self) -> bool {
        true
    }

    pub fn is_subscription_error(&self) -> bool {
        matches!(self, StoreError::Subscription { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let sub = StoreError::subscription("socket closed");
        assert!(sub.is_subscription_error());
        assert!(sub.is_recoverable());
        assert!(sub.to_string().contains("socket closed"));

        let write = StoreError::write("offline");
        assert!(!write.is_subscription_error());
    }
}
