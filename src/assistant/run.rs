// src/assistant/run.rs
// Bounded, cancellable polling of an assistant run.

use super::client::{AssistantApi, AssistantError, Run, RunStatus};
use crate::monitoring::metrics;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Resolves once the flag turns true; never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn abandon(api: &dyn AssistantApi, thread_id: &str, run_id: &str) {
    if let Err(e) = api.cancel_run(thread_id, run_id).await {
        warn!(run_id, error = %e, "Failed to cancel assistant run");
    }
}

/// Polls `run_id` until it leaves the pending states.
///
/// On timeout or cancellation the remote run is cancelled before returning.
pub async fn wait_for_run(
    api: &dyn AssistantApi,
    thread_id: &str,
    run_id: &str,
    poll: PollSettings,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Run, AssistantError> {
    let deadline = Instant::now() + poll.timeout;
    loop {
        if *cancel.borrow() {
            abandon(api, thread_id, run_id).await;
            return Err(AssistantError::Cancelled);
        }

        let run = api.retrieve_run(thread_id, run_id).await?;
        metrics::ASSISTANT_POLLS_TOTAL.inc();
        debug!(run_id, status = %run.status, "Polled assistant run");

        if !run.status.is_pending() {
            return match run.status {
                RunStatus::Completed => Ok(run),
                status => Err(AssistantError::RunFailed {
                    status,
                    last_error: run.last_error.map(|e| e.message),
                }),
            };
        }

        tokio::select! {
            _ = tokio::time::sleep(poll.interval) => {}
            _ = tokio::time::sleep_until(deadline) => {
                warn!(run_id, timeout = ?poll.timeout, "Assistant run timed out");
                abandon(api, thread_id, run_id).await;
                return Err(AssistantError::Timeout(poll.timeout));
            }
            _ = cancelled(cancel) => {
                abandon(api, thread_id, run_id).await;
                return Err(AssistantError::Cancelled);
            }
        }
    }
}
