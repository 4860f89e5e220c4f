//! Remove command - delete a request

use anyhow::Context;
use clap::Args;
use reviewdesk_core::{Config, RequestId};

use super::context::{open_database, require_owner};

/// Delete a review request owned by the signed-in owner
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Request id
    pub id: String,
}

impl RemoveArgs {
    /// Execute the remove command
    pub async fn execute(&self, _verbose: bool, config: &Config) -> anyhow::Result<()> {
        let owner = require_owner(config)?;
        let id = RequestId::from(self.id.as_str());

        let db = open_database(config).await?;
        let removed = db
            .requests()
            .remove(&id, &owner)
            .await
            .context("Failed to delete review request")?;
        db.close().await;

        match removed {
            Some(request) => {
                println!("Removed review request {} ({})", request.id, request.name);
                Ok(())
            }
            None => anyhow::bail!("No request {} found for {}", id, owner),
        }
    }
}
