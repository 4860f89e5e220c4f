//! Send command - create a new review request

use anyhow::Context;
use clap::Args;
use reviewdesk_core::{Config, NewRequest, OwnerId};

use super::context::{open_database, require_owner};

/// Send a review request to a customer
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Customer name
    #[arg(short, long)]
    pub name: String,

    /// Customer phone number, digits only
    #[arg(short, long)]
    pub phone: String,

    /// Custom message; a default greeting is used when omitted
    #[arg(short, long)]
    pub message: Option<String>,
}

impl SendArgs {
    /// Build the request this command would insert
    pub fn to_request(&self, owner: OwnerId) -> NewRequest {
        let request = NewRequest::new(owner, self.name.trim(), self.phone.trim());
        match &self.message {
            Some(message) => request.with_message(message.trim()),
            None => request,
        }
    }

    /// Execute the send command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let owner = require_owner(config)?;
        let request = self.to_request(owner);
        request.validate().context("Invalid review request")?;

        let db = open_database(config).await?;
        let created = db
            .requests()
            .create(&request)
            .await
            .context("Failed to save review request")?;

        println!("Sent review request {}", created.id);
        println!("  To: {} ({})", created.name, created.phone);
        println!("  Message: {}", request.effective_message());

        if verbose {
            tracing::info!(id = %created.id, owner = %created.owner_id, "Review request stored");
        }

        db.close().await;
        Ok(())
    }
}
