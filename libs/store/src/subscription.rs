//! Cancellable message subscription handle.

use tokio::sync::mpsc;
use types::RawMessage;
use uuid::Uuid;

/// Live subscription to one (device, tab) message channel.
///
/// Carries its own identity so consumers can key stale-update guards on the
/// subscription instance rather than on the tuple it observes. Dropping the
/// handle closes the receiving end, which the store observes as cancellation.
#[derive(Debug)]
pub struct MessageSubscription {
    id: Uuid,
    receiver: mpsc::Receiver<Vec<RawMessage>>,
}

impl MessageSubscription {
    pub fn new(receiver: mpsc::Receiver<Vec<RawMessage>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            receiver,
        }
    }

    /// Unique identity of this subscription instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next batch of raw records, in store insertion order.
    ///
    /// Returns `None` once the store drops its sending side.
    pub async fn next_batch(&mut self) -> Option<Vec<RawMessage>> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn test_subscription_delivers_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = MessageSubscription::new(rx);

        tx.send(vec![RawMessage::new("k1", Map::new())])
            .await
            .unwrap();
        drop(tx);

        let batch = sub.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].key, "k1");
        assert!(sub.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_ids_are_distinct() {
        let (_tx1, rx1) = mpsc::channel::<Vec<RawMessage>>(1);
        let (_tx2, rx2) = mpsc::channel::<Vec<RawMessage>>(1);
        assert_ne!(
            MessageSubscription::new(rx1).id(),
            MessageSubscription::new(rx2).id()
        );
    }
}
