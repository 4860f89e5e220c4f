//! Push change feed types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::request::{OwnerId, Request};
use crate::Result;

/// Kind of row change reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change
///
/// `new` carries the row after an insert or update, `old` the row before
/// a delete. Payloads are raw JSON rows and may be malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn insert(row: &Request) -> Result<Self> {
        Ok(Self {
            kind: ChangeKind::Insert,
            new: Some(row.to_payload()?),
            old: None,
        })
    }

    pub fn update(row: &Request) -> Result<Self> {
        Ok(Self {
            kind: ChangeKind::Update,
            new: Some(row.to_payload()?),
            old: None,
        })
    }

    pub fn delete(row: &Request) -> Result<Self> {
        Ok(Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(row.to_payload()?),
        })
    }
}

/// Message delivered on a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A row changed
    Change(ChangeEvent),

    /// The transport lost its connection; data may be stale
    Disconnected,

    /// The transport is back; a full refetch is needed to close the gap
    Reconnected,
}

/// Live subscription to changes for one owner
///
/// Dropping the subscription closes it.
#[derive(Debug)]
pub struct Subscription {
    owner: OwnerId,
    receiver: mpsc::Receiver<FeedMessage>,
}

impl Subscription {
    pub fn new(owner: OwnerId, receiver: mpsc::Receiver<FeedMessage>) -> Self {
        Self { owner, receiver }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Wait for the next message; `None` once the transport has gone away
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    /// Stop receiving; the producer sees the channel as closed
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Source of push notifications filtered by owner
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for changes to `owner`'s requests
    async fn subscribe(&self, owner: &OwnerId) -> Result<Subscription>;
}
