//! Mark command - change the status of a request

use anyhow::Context;
use clap::Args;
use reviewdesk_core::{Config, RequestId, RequestStatus};

use super::context::{LiveSession, StatusArg};

/// Mark a review request as pending or reviewed
#[derive(Args, Debug)]
pub struct MarkArgs {
    /// Request id
    pub id: String,

    /// New status
    #[arg(value_enum)]
    pub status: StatusArg,
}

impl MarkArgs {
    /// Execute the mark command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let (session, _) = LiveSession::start(config).await?;
        let id = RequestId::from(self.id.as_str());
        let status = RequestStatus::from(self.status);

        let result = session
            .sync
            .update_status(&id, status)
            .await
            .with_context(|| format!("Failed to mark {} as {}", id, status));

        if result.is_ok() {
            println!("Marked {} as {}", id, status);
            if verbose {
                let stats = session.sync.snapshot().stats();
                tracing::info!(
                    reviewed = stats.reviewed,
                    pending = stats.pending,
                    "Request counts after update"
                );
            }
        }

        session.close().await;
        result
    }
}
