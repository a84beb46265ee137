//! Job status polling.
//!
//! ```text
//!   Submitted ──→ Polling ──┬──→ Completed
//!                  ↑   │    ├──→ Failed      (one extra query for the reason)
//!                  └───┘    └──→ Cancelled
//!               sleep(interval)
//! ```
//!
//! The cancellation token is checked before every status query and raced
//! against every sleep, so a cancelled task never waits out a full interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{ExecutorError, ExecutorResult};
use crate::job::{JobHandle, JobStatus};
use crate::service::JobService;

/// Suspends the poll loop between ticks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Input to [`Poller::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    /// Job to poll.
    pub job_handle: JobHandle,
    /// Interval between status queries.
    pub interval: Duration,
    /// Upper bound on total time spent sleeping.
    pub timeout: Option<Duration>,
}

/// Poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Job created, not yet queried.
    Submitted,
    /// Waiting for a terminal status.
    Polling,
    /// Job completed.
    Completed,
    /// Job failed.
    Failed,
    /// Job cancelled.
    Cancelled,
}

impl PollState {
    /// Whether polling has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Completed | PollState::Failed | PollState::Cancelled
        )
    }

    /// Transition on an observed job status. Terminal states never change.
    pub fn observe(self, status: &JobStatus) -> PollState {
        if self.is_terminal() {
            return self;
        }
        match status {
            JobStatus::Completed => PollState::Completed,
            JobStatus::Failed => PollState::Failed,
            JobStatus::Cancelled => PollState::Cancelled,
            _ => PollState::Polling,
        }
    }
}

/// How polling ended, when it ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job completed; results can be fetched.
    Completed,
    /// The job was cancelled remotely.
    Cancelled,
}

/// Polls a job to a terminal state.
#[derive(Clone)]
pub struct Poller {
    jobs: Arc<dyn JobService>,
    sleeper: Arc<dyn Sleeper>,
}

impl Poller {
    /// Create a poller.
    pub fn new(jobs: Arc<dyn JobService>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { jobs, sleeper }
    }

    /// Poll until the job reaches a terminal status.
    ///
    /// `Failed` raises [`ExecutorError::JobExecutionFailure`] with the
    /// service's failure reason. A fired `cancel` token raises
    /// [`ExecutorError::TaskCancelled`].
    #[instrument(skip(self, cancel), fields(job = %request.job_handle))]
    pub async fn poll(
        &self,
        request: &PollRequest,
        cancel: &CancellationToken,
    ) -> ExecutorResult<PollOutcome> {
        let handle = &request.job_handle;
        let mut state = PollState::Submitted;
        let mut waited = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(ExecutorError::TaskCancelled(handle.to_string()));
            }

            let info = self
                .jobs
                .get_job(handle)
                .await
                .map_err(ExecutorError::StatusQuery)?;
            state = state.observe(&info.status);
            debug!(status = %info.status, ?state, "polled job");

            match state {
                PollState::Completed => {
                    info!("Job {} completed", handle);
                    return Ok(PollOutcome::Completed);
                }
                PollState::Failed => {
                    let detail = self
                        .jobs
                        .get_job(handle)
                        .await
                        .map_err(ExecutorError::StatusQuery)?;
                    let reason = detail
                        .failure_reason
                        .or(info.failure_reason)
                        .unwrap_or_else(|| "no failure reason reported".to_string());
                    return Err(ExecutorError::JobExecutionFailure(reason));
                }
                PollState::Cancelled => {
                    info!("Job {} was cancelled", handle);
                    return Ok(PollOutcome::Cancelled);
                }
                PollState::Submitted | PollState::Polling => {}
            }

            if let Some(limit) = request.timeout {
                if waited >= limit {
                    return Err(ExecutorError::PollTimeout {
                        waited,
                        job: handle.to_string(),
                    });
                }
            }

            tokio::select! {
                _ = self.sleeper.sleep(request.interval) => {}
                _ = cancel.cancelled() => {
                    return Err(ExecutorError::TaskCancelled(handle.to_string()));
                }
            }
            waited += request.interval;
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller").finish_non_exhaustive()
    }
}
