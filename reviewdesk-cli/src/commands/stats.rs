//! Stats command - request counts for the owner

use clap::Args;
use reviewdesk_core::Config;

use super::context::LiveSession;

/// Show how many requests have been reviewed
#[derive(Args, Debug)]
pub struct StatsArgs {}

impl StatsArgs {
    /// Execute the stats command
    pub async fn execute(&self, _verbose: bool, config: &Config) -> anyhow::Result<()> {
        let (session, snapshot) = LiveSession::start(config).await?;
        let stats = snapshot.stats();

        println!("Total:    {}", stats.total);
        println!("Reviewed: {}", stats.reviewed);
        println!("Pending:  {}", stats.pending);

        session.close().await;
        Ok(())
    }
}
