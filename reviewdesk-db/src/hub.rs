//! In-process change feed for the request table
//!
//! Every successful write made through [`RequestRepository`] is broadcast
//! here. Each subscription runs a small forwarder task that filters the
//! broadcast by owner and pushes matching events into the subscription's
//! queue. A subscriber that falls behind the broadcast buffer is told it
//! was disconnected and reconnected, so it re-seeds instead of silently
//! missing rows.
//!
//! [`RequestRepository`]: crate::repos::RequestRepository

use async_trait::async_trait;
use reviewdesk_core::{ChangeEvent, ChangeFeed, ChangeKind, FeedMessage, OwnerId, Request, Subscription};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct OwnedChange {
    owner: OwnerId,
    event: ChangeEvent,
}

/// Broadcasts row changes to owner-filtered subscriptions
#[derive(Debug, Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<OwnedChange>,
    buffer: usize,
}

impl ChangeHub {
    /// Create a hub whose broadcast and per-subscription queues hold `buffer` events
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender, buffer }
    }

    /// Broadcast a change of `row`
    pub fn publish(&self, kind: ChangeKind, row: &Request) {
        let event = match kind {
            ChangeKind::Insert => ChangeEvent::insert(row),
            ChangeKind::Update => ChangeEvent::update(row),
            ChangeKind::Delete => ChangeEvent::delete(row),
        };

        match event {
            Ok(event) => {
                let change = OwnedChange {
                    owner: row.owner_id.clone(),
                    event,
                };
                // No receivers is fine; nobody is watching this owner
                let _ = self.sender.send(change);
            }
            Err(e) => {
                tracing::warn!(id = %row.id, kind = ?kind, error = %e, "Failed to encode change event");
            }
        }
    }

    /// Number of open subscriptions across all owners
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ChangeFeed for ChangeHub {
    async fn subscribe(&self, owner: &OwnerId) -> reviewdesk_core::Result<Subscription> {
        let mut changes = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(self.buffer);
        let filter = owner.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = tx.closed() => break,
                    received = changes.recv() => match received {
                        Ok(change) if change.owner == filter => FeedMessage::Change(change.event),
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(owner = %filter, skipped, "Change feed subscriber lagged");
                            if tx.send(FeedMessage::Disconnected).await.is_err() {
                                break;
                            }
                            FeedMessage::Reconnected
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                if tx.send(message).await.is_err() {
                    break;
                }
            }
            tracing::debug!(owner = %filter, "Change feed forwarder stopped");
        });

        tracing::debug!(
            owner = %owner,
            subscribers = self.subscriber_count(),
            "Opened change feed subscription"
        );
        Ok(Subscription::new(owner.clone(), rx))
    }
}
