//! ReviewDesk Core - Core library for ReviewDesk
//!
//! This crate provides the review request domain model and the live
//! request synchronizer that keeps an owner's list consistent with a
//! remote store and its change feed. Customers can be staged and sent
//! as requests later.

pub mod config;
pub mod customer;
pub mod error;
pub mod request;
pub mod sync;

pub use config::{Config, DatabaseSettings, SessionConfig, SyncConfig};
pub use customer::{Customer, CustomerId, NewCustomer};
pub use error::{Error, Result};
pub use request::{NewRequest, OwnerId, Request, RequestId, RequestStats, RequestStatus, ValidationError};
pub use sync::{
    ChangeEvent, ChangeFeed, ChangeKind, FeedMessage, Freshness, RequestStore, SnapshotStream,
    Subscription, SyncSnapshot, Synchronizer,
};
