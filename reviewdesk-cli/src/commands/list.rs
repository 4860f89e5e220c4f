//! List command - print the owner's review requests

use anyhow::Context;
use clap::Args;
use reviewdesk_core::{Config, OwnerId, Request, RequestStatus};
use reviewdesk_db::Database;

use super::context::{open_database, print_requests, require_owner, StatusArg};

/// List review requests, newest first
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show requests in this status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,
}

impl ListArgs {
    async fn load(&self, db: &Database, owner: &OwnerId) -> anyhow::Result<Vec<Request>> {
        let repo = db.requests();
        let requests = match self.status {
            Some(status) => repo.list_by_status(owner, RequestStatus::from(status)).await,
            None => repo.list_by_owner(owner).await,
        };
        requests.context("Failed to load review requests")
    }

    /// Execute the list command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let owner = require_owner(config)?;
        let db = open_database(config).await?;
        let requests = self.load(&db, &owner).await;
        db.close().await;
        let requests = requests?;

        if verbose {
            tracing::info!(count = requests.len(), owner = %owner, "Loaded review requests");
        }

        println!();
        println!("Review Requests:");
        println!();
        print_requests(&requests);
        println!();

        Ok(())
    }
}
