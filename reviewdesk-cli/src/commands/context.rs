//! Shared setup and output helpers for commands

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use reviewdesk_core::{
    Config, OwnerId, Request, RequestStatus, SnapshotStream, SyncSnapshot, Synchronizer,
};
use reviewdesk_db::{Database, DatabaseConfig};

/// Request status as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Pending,
    Reviewed,
}

impl From<StatusArg> for RequestStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => RequestStatus::Pending,
            StatusArg::Reviewed => RequestStatus::Reviewed,
        }
    }
}

/// Owner every command acts on behalf of
pub fn require_owner(config: &Config) -> anyhow::Result<OwnerId> {
    config
        .session
        .owner_id()
        .context("No owner signed in; pass --owner or set REVIEWDESK_OWNER")
}

/// Open the request database described by `config`
pub async fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db_config = DatabaseConfig::from_config(config)?;
    Database::connect(&db_config)
        .await
        .with_context(|| format!("Failed to open database at {}", db_config.path.display()))
}

/// Database plus a synchronizer following one owner
pub struct LiveSession {
    pub db: Database,
    pub sync: Synchronizer,
    pub stream: SnapshotStream,
}

impl LiveSession {
    /// Open the database, subscribe for the configured owner and wait for the seed
    pub async fn start(config: &Config) -> anyhow::Result<(Self, SyncSnapshot)> {
        let owner = require_owner(config)?;
        let db = open_database(config).await?;

        let sync = Synchronizer::spawn(
            Arc::new(db.requests()),
            Arc::new(db.hub().clone()),
            config.sync.clone(),
        );
        let mut stream = sync.subscribe(Some(owner.clone())).await?;
        let seeded = stream
            .wait_seeded()
            .await
            .with_context(|| format!("Failed to load requests for {}", owner))?;

        Ok((Self { db, sync, stream }, seeded))
    }

    /// Stop the synchronizer and close the database
    pub async fn close(self) {
        self.sync.shutdown().await;
        self.db.close().await;
    }
}

/// Compact age such as `5m` or `2d 3h`
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// One line describing a request
pub fn format_request(request: &Request, now: DateTime<Utc>) -> String {
    format!(
        "{:<36}  {:<8}  {:<20}  {:<15}  {} ago",
        request.id.as_str(),
        request.status.as_str(),
        request.name,
        request.phone,
        format_age((now - request.created_at).num_seconds())
    )
}

pub fn print_requests<'a>(requests: impl IntoIterator<Item = &'a Request>) {
    let now = Utc::now();
    let mut count = 0;
    for request in requests {
        println!("  {}", format_request(request, now));
        count += 1;
    }
    if count == 0 {
        println!("  No review requests.");
    }
}
