use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::orchestrator::SyncOrchestrator;

/// Wait after a failed run before trying again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(3600);

/// Schedule for repeated sync runs
#[derive(Debug, Clone)]
pub struct PeriodicSchedule {
    pub interval: Duration,
    pub error_backoff: Duration,
    /// Stop after this many runs; `None` runs until cancelled
    pub max_runs: Option<usize>,
}

impl PeriodicSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            error_backoff: ERROR_BACKOFF,
            max_runs: None,
        }
    }
}

/// Run `run_sync` on a fixed interval until cancelled.
///
/// A run that fails at setup is logged and retried after `error_backoff`.
/// Returns the number of runs started.
pub async fn run_periodic(
    orchestrator: &SyncOrchestrator,
    listing_url: &str,
    max_detail_fetches: usize,
    schedule: &PeriodicSchedule,
    cancel: &CancellationToken,
) -> usize {
    let mut runs = 0;

    while !cancel.is_cancelled() {
        runs += 1;
        let wait = match orchestrator.run_sync(listing_url, max_detail_fetches, cancel).await {
            Ok(_) => {
                info!("Next sync in {:?}", schedule.interval);
                schedule.interval
            }
            Err(e) => {
                error!("Error in periodic sync: {}", e);
                schedule.error_backoff
            }
        };

        if schedule.max_runs.is_some_and(|max| runs >= max) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Periodic sync stopped");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }

    runs
}
