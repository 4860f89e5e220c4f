//! CLI command implementations

pub mod context;
pub mod customer;
pub mod list;
pub mod mark;
pub mod remove;
pub mod send;
pub mod stats;
pub mod watch;

pub use customer::CustomerArgs;
pub use list::ListArgs;
pub use mark::MarkArgs;
pub use remove::RemoveArgs;
pub use send::SendArgs;
pub use stats::StatsArgs;
pub use watch::WatchArgs;
