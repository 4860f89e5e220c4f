//! Live synchronization of the request list
//!
//! The [`Synchronizer`] keeps an owner's requests current by seeding from a
//! [`RequestStore`] and applying [`ChangeFeed`] events on top, with
//! optimistic status edits reconciled against the remote write.

mod engine;
mod feed;
mod list;
mod pending;
mod snapshot;
mod store;

pub use engine::Synchronizer;
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, FeedMessage, Subscription};
pub use list::{Outcome, RequestList};
pub use pending::{PendingWrites, Resolution};
pub use snapshot::{Freshness, SnapshotStream, SyncSnapshot};
pub use store::RequestStore;
