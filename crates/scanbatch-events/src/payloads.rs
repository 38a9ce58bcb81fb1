//! Event payload types carried between the transformer, dispatcher, and callers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event emitted on a bus.
pub type EventId = u64;

/// Identifier assigned to a single dispatched batch run.
pub type JobId = Uuid;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed events surfaced while a batch run or environment bootstrap is in flight.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch run was accepted and is about to start.
    JobStarted {
        /// Identifier for the run.
        job_id: JobId,
        /// Source directory being processed.
        source_dir: String,
        /// Number of entries counted in the source directory at dispatch time.
        total_entries: usize,
    },
    /// The transformer entered a new pipeline step.
    StepChanged {
        /// Identifier for the run.
        job_id: JobId,
        /// Machine-friendly step label.
        step: String,
    },
    /// Progress state was reset at run start; counts as the run's first tick.
    ProgressReset {
        /// Identifier for the run.
        job_id: JobId,
    },
    /// One source entry was handled by the copy pass.
    EntryProcessed {
        /// Identifier for the run.
        job_id: JobId,
        /// Zero-based position of the entry in the source listing.
        index: usize,
        /// Base name of the entry.
        name: String,
        /// What the copy pass did with the entry.
        action: EntryAction,
    },
    /// A destination entry was renamed.
    EntryRenamed {
        /// Identifier for the run.
        job_id: JobId,
        /// Original base name.
        from: String,
        /// New base name.
        to: String,
    },
    /// The run finished without error.
    JobCompleted {
        /// Identifier for the run.
        job_id: JobId,
    },
    /// The run aborted.
    JobFailed {
        /// Identifier for the run.
        job_id: JobId,
        /// Human-readable failure description.
        message: String,
    },
    /// The readiness state machine for an execution environment moved.
    EnvironmentStateChanged {
        /// Name of the execution environment.
        env_name: String,
        /// New state label.
        state: String,
    },
    /// Heartbeat emitted while an environment bootstrap is running.
    BootstrapProgress {
        /// Name of the execution environment.
        env_name: String,
        /// Seconds elapsed since the bootstrap started.
        elapsed_secs: u64,
    },
}

impl Event {
    /// Machine-friendly discriminator for log consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::StepChanged { .. } => "step_changed",
            Self::ProgressReset { .. } => "progress_reset",
            Self::EntryProcessed { .. } => "entry_processed",
            Self::EntryRenamed { .. } => "entry_renamed",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::EnvironmentStateChanged { .. } => "environment_state_changed",
            Self::BootstrapProgress { .. } => "bootstrap_progress",
        }
    }

    /// Job the event belongs to, when it is tied to a batch run.
    #[must_use]
    pub const fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::StepChanged { job_id, .. }
            | Self::ProgressReset { job_id }
            | Self::EntryProcessed { job_id, .. }
            | Self::EntryRenamed { job_id, .. }
            | Self::JobCompleted { job_id }
            | Self::JobFailed { job_id, .. } => Some(*job_id),
            Self::EnvironmentStateChanged { .. } | Self::BootstrapProgress { .. } => None,
        }
    }
}

/// Outcome of the copy pass for a single entry.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    /// Volume re-encoded through the image adapter.
    Converted,
    /// File copied byte for byte.
    Copied,
    /// Entry left alone because its extension is not handled.
    Skipped,
}

impl EntryAction {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Copied => "copied",
            Self::Skipped => "skipped",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event.
    pub event: Event,
}
