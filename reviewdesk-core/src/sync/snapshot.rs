//! Read-only views of the live request list

use serde::Serialize;
use tokio::sync::watch;

use crate::request::{OwnerId, Request, RequestStats};
use crate::{Error, Result};

/// How current the published list is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Seeded and connected to the change feed
    Live,
    /// Feed disconnected or not yet seeded; the list may lag the store
    #[default]
    Stale,
}

/// Immutable copy of the list handed to consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSnapshot {
    /// Owner the list belongs to; `None` when nobody is signed in
    pub owner: Option<OwnerId>,

    /// Requests, newest first
    pub requests: Vec<Request>,

    pub freshness: Freshness,

    /// Whether the initial fetch for this owner has completed
    pub seeded: bool,

    /// Last fetch failure, cleared by the next successful fetch
    pub error: Option<String>,
}

impl SyncSnapshot {
    /// Snapshot published right after an owner change
    pub fn empty(owner: Option<OwnerId>) -> Self {
        let seeded = owner.is_none();
        Self {
            owner,
            seeded,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats::from_requests(&self.requests)
    }

    pub fn is_live(&self) -> bool {
        self.freshness == Freshness::Live
    }
}

/// Stream of snapshots for one owner
#[derive(Debug, Clone)]
pub struct SnapshotStream {
    owner: Option<OwnerId>,
    receiver: watch::Receiver<SyncSnapshot>,
}

impl SnapshotStream {
    pub(crate) fn new(owner: Option<OwnerId>, receiver: watch::Receiver<SyncSnapshot>) -> Self {
        Self { owner, receiver }
    }

    /// Latest published snapshot
    pub fn current(&self) -> SyncSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot; `None` once the synchronizer has stopped
    pub async fn changed(&mut self) -> Option<SyncSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the initial fetch for this stream's owner has finished
    ///
    /// Fails with [`Error::SessionChanged`] once another owner has been
    /// subscribed, since this owner's list will never be seeded.
    pub async fn wait_seeded(&mut self) -> Result<SyncSnapshot> {
        let owner = self.owner.clone();
        let snapshot = self
            .receiver
            .wait_for(|s| s.owner != owner || s.seeded || s.error.is_some())
            .await
            .map_err(|_| Error::Closed)?
            .clone();

        if snapshot.owner != owner {
            return Err(Error::SessionChanged);
        }
        match (&snapshot.error, snapshot.seeded) {
            (Some(e), false) => Err(Error::Store(e.clone())),
            _ => Ok(snapshot),
        }
    }
}
