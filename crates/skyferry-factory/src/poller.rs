//! Polls a pipeline run to a terminal status on a capped exponential schedule.
//!
//! # Design
//! - Query first, sleep only after a non-terminal observation.
//! - Every wait, including the status query itself, races the cancellation token and the overall
//!   deadline; a cancelled poll returns immediately.
//! - Unrecognised statuses keep polling with a warning; the overall timeout bounds them.
//! - Failed status queries are retried on the same schedule up to a consecutive limit.

use std::sync::Arc;
use std::time::Duration;

use skyferry_config::PollSettings;
use skyferry_core::{
    PipelineRun, PipelineService, RunSnapshot, RunStatus, TransferError, TransferOutcome,
    TransferResult,
};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff schedule and limits for one poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first non-terminal observation.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Ceiling on the total wait.
    pub timeout: Duration,
    /// Consecutive failed queries tolerated.
    pub status_error_limit: u32,
}

impl PollPolicy {
    /// Delay before the query following the `attempt`-th observation (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1).min(63)).unwrap_or(63);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self {
            initial_delay: settings.initial_interval,
            max_delay: settings.max_interval,
            backoff_factor: settings.backoff_factor,
            timeout: settings.run_timeout,
            status_error_limit: settings.status_error_limit.max(1),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

/// Outcome for a terminal status, or `None` while the run is still moving.
///
/// Success maps to a successful outcome; the failure family maps to a retryable failure carrying
/// the service's message, or a generated one when the service gave none.
#[must_use]
pub fn terminal_outcome(status: &RunStatus, message: Option<&str>) -> Option<TransferOutcome> {
    match status {
        RunStatus::Succeeded => Some(TransferOutcome::success()),
        RunStatus::Failed | RunStatus::Canceling | RunStatus::Cancelled => {
            Some(TransferOutcome::retryable_failure(message.map_or_else(
                || format!("pipeline run ended with status {status}"),
                str::to_string,
            )))
        }
        RunStatus::Queued | RunStatus::InProgress | RunStatus::Unrecognized(_) => None,
    }
}

/// Drives status queries for triggered runs.
pub struct RunPoller {
    pipelines: Arc<dyn PipelineService>,
    policy: PollPolicy,
}

impl RunPoller {
    /// Poller querying `pipelines` under `policy`.
    #[must_use]
    pub fn new(pipelines: Arc<dyn PipelineService>, policy: PollPolicy) -> Self {
        Self { pipelines, policy }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll until the run reaches a terminal status, the timeout passes, or `cancel` fires.
    ///
    /// `observe` sees every successful status observation in order.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Cancelled`] when cancelled and [`TransferError::StatusQuery`]
    /// once the consecutive query failure limit is reached. A timeout is an outcome, not an error.
    pub async fn await_terminal<F>(
        &self,
        request_id: &str,
        run: &PipelineRun,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> TransferResult<TransferOutcome>
    where
        F: FnMut(&RunSnapshot) + Send,
    {
        let cancelled = || TransferError::Cancelled {
            request_id: request_id.to_string(),
        };
        let timed_out = || {
            warn!(run_id = %run.run_id, timeout = ?self.policy.timeout, "pipeline run did not finish in time");
            TransferOutcome::retryable_failure(format!(
                "pipeline run {} did not reach a terminal status within {:?}",
                run.run_id, self.policy.timeout
            ))
        };
        let deadline = Instant::now() + self.policy.timeout;
        let mut attempt: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            let query = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = sleep_until(deadline) => return Ok(timed_out()),
                result = self.pipelines.run_status(&run.run_id) => result,
            };
            attempt = attempt.saturating_add(1);

            match query {
                Ok(snapshot) => {
                    consecutive_errors = 0;
                    observe(&snapshot);
                    let status = snapshot.run_status();
                    if let Some(outcome) = terminal_outcome(&status, snapshot.message.as_deref()) {
                        debug!(run_id = %run.run_id, status = %status, attempt, "pipeline run finished");
                        return Ok(outcome);
                    }
                    if let RunStatus::Unrecognized(raw) = &status {
                        warn!(run_id = %run.run_id, status = %raw, "unrecognised pipeline run status; continuing to poll");
                    } else {
                        debug!(run_id = %run.run_id, status = %status, attempt, "pipeline run in flight");
                    }
                }
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(
                        error = %err,
                        run_id = %run.run_id,
                        consecutive_errors,
                        "pipeline run status query failed"
                    );
                    if consecutive_errors >= self.policy.status_error_limit {
                        return Err(TransferError::StatusQuery {
                            run_id: run.run_id.clone(),
                            attempts: consecutive_errors,
                            source: err.into(),
                        });
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(timed_out());
            }
            let delay = self.policy.delay_for_attempt(attempt).min(deadline - now);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = sleep(delay) => {}
            }
        }
    }
}
