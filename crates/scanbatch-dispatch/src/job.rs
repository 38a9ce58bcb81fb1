//! Dispatch modes, job handles, and job results.

use async_trait::async_trait;
use scanbatch_events::JobId;
use scanbatch_transform::TransformSummary;
use tokio::task::JoinHandle;

use crate::error::{DispatchError, DispatchResult};
use crate::monitor::TickSource;

/// Where a batch run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// In-process, on a blocking worker thread.
    Local,
    /// As a subprocess inside the named managed environment.
    Remote(String),
}

impl DispatchMode {
    /// Label used in logs and spans.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote(_) => "remote",
        }
    }
}

/// Asked once before a missing environment is created.
#[async_trait]
pub trait BootstrapDecision: Send + Sync {
    /// Return `true` to create `env_name`.
    async fn confirm(&self, env_name: &str) -> bool;
}

/// Decision that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub bool);

#[async_trait]
impl BootstrapDecision for FixedDecision {
    async fn confirm(&self, _env_name: &str) -> bool {
        self.0
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// In-process run.
    Local {
        /// Whether the transformer completed.
        success: bool,
        /// Failure description when it did not.
        error: Option<String>,
        /// Counts from a completed run.
        summary: Option<TransformSummary>,
    },
    /// Subprocess run inside a managed environment.
    Remote {
        /// Worker exit code.
        exit_code: Option<i32>,
        /// Captured worker stdout.
        stdout: String,
        /// Captured worker stderr.
        stderr: String,
    },
}

impl JobResult {
    /// Whether the run succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Local { success, .. } => *success,
            Self::Remote { exit_code, .. } => matches!(exit_code, Some(0)),
        }
    }
}

/// Handle on a dispatched run. Dropping it detaches the run; it is never cancelled.
pub struct JobHandle {
    job_id: JobId,
    total_entries: usize,
    ticks: Option<TickSource>,
    task: JoinHandle<DispatchResult<JobResult>>,
}

impl JobHandle {
    pub(crate) const fn new(
        job_id: JobId,
        total_entries: usize,
        ticks: TickSource,
        task: JoinHandle<DispatchResult<JobResult>>,
    ) -> Self {
        Self {
            job_id,
            total_entries,
            ticks: Some(ticks),
            task,
        }
    }

    /// Identifier carried by the run's events.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Source entries counted at dispatch time.
    #[must_use]
    pub const fn total_entries(&self) -> usize {
        self.total_entries
    }

    /// Whether the background unit has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Take the progress tick source; `None` once taken.
    pub const fn take_ticks(&mut self) -> Option<TickSource> {
        self.ticks.take()
    }

    /// Wait for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Join`] if the background unit panicked, or the
    /// error the run itself produced.
    pub async fn wait(self) -> DispatchResult<JobResult> {
        self.task
            .await
            .map_err(|source| DispatchError::Join { source })?
    }
}
