//! Watch command - follow the request list as it changes

use std::time::Duration;

use clap::Args;
use reviewdesk_core::{Config, Freshness, SyncSnapshot};

use super::context::{print_requests, LiveSession};

/// Print the request list every time it changes
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between full re-seeds (overrides sync.refresh_interval)
    #[arg(long)]
    pub refresh_interval: Option<u64>,
}

impl WatchArgs {
    fn interval(&self, config: &Config) -> Duration {
        let interval = self
            .refresh_interval
            .map(Duration::from_secs)
            .unwrap_or(config.sync.refresh_interval);
        interval.max(Duration::from_secs(1))
    }

    /// Execute the watch command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let (mut session, snapshot) = LiveSession::start(config).await?;
        let period = self.interval(config);

        if verbose {
            tracing::info!(refresh_interval = ?period, "Watching review requests");
        }
        print_snapshot(&snapshot);

        let mut refresh = tokio::time::interval(period);
        // The first tick completes immediately and the list was just seeded
        refresh.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    println!("Stopped watching.");
                    break;
                }
                _ = refresh.tick() => {
                    if let Err(e) = session.sync.refresh().await {
                        tracing::warn!(error = %e, "Periodic refresh failed");
                    }
                }
                changed = session.stream.changed() => match changed {
                    Some(snapshot) => print_snapshot(&snapshot),
                    None => {
                        tracing::warn!("Synchronizer stopped");
                        break;
                    }
                },
            }
        }

        session.close().await;
        Ok(())
    }
}

fn status_line(snapshot: &SyncSnapshot) -> String {
    let stats = snapshot.stats();
    let freshness = match snapshot.freshness {
        Freshness::Live => "live",
        Freshness::Stale => "stale",
    };

    let mut line = format!(
        "[{}] {} requests, {} reviewed, {} pending",
        freshness, stats.total, stats.reviewed, stats.pending
    );
    if let Some(error) = &snapshot.error {
        line.push_str(&format!(" (last refresh failed: {})", error));
    }
    line
}

fn print_snapshot(snapshot: &SyncSnapshot) {
    println!();
    println!("{}", status_line(snapshot));
    print_requests(&snapshot.requests);
}
