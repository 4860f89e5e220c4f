//! Database layer for ReviewDesk
//!
//! Persists review requests in SQLite and implements the store and
//! change feed the live synchronizer runs against.

pub mod connection;
pub mod error;
pub mod hub;
pub mod models;
pub mod repos;

pub use connection::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use hub::ChangeHub;
pub use models::{CustomerRow, RequestRow};
pub use repos::{CustomerRepository, RequestRepository};
