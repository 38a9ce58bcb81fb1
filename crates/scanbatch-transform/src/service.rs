//! Batch folder-transform pipeline.
//!
//! A run is four steps executed in order: validate the parameters, reset the
//! signal file, copy or convert every source entry into the destination, and
//! rename destination entries by substring replacement.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use filetime::FileTime;
use scanbatch_config::JobParameters;
use scanbatch_events::{EntryAction, Event, EventBus, JobId};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entry::{DirectoryEntry, EntryKind, list_entries, replaced_name};
use crate::error::{TransformError, TransformResult};
use crate::image::{ImageIo, NiftiIo};
use crate::signal::SignalFile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepKind {
    Validate,
    ResetSignal,
    CopyPass,
    RenamePass,
}

impl StepKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::ResetSignal => "reset_signal",
            Self::CopyPass => "copy_pass",
            Self::RenamePass => "rename_pass",
        }
    }
}

enum StepOutcome {
    Completed(Option<String>),
    Skipped(Option<String>),
}

impl StepOutcome {
    const fn status(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Skipped(_) => "skipped",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            Self::Completed(detail) | Self::Skipped(detail) => detail.as_deref(),
        }
    }
}

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    /// Source entries visited by the copy pass.
    pub processed: usize,
    /// Meshes copied byte for byte.
    pub copied: usize,
    /// Volumes re-encoded through the image adapter.
    pub converted: usize,
    /// Entries left alone.
    pub skipped: usize,
    /// Destination entries renamed.
    pub renamed: usize,
}

impl TransformSummary {
    const fn record(&mut self, action: EntryAction) {
        self.processed += 1;
        match action {
            EntryAction::Converted => self.converted += 1,
            EntryAction::Copied => self.copied += 1,
            EntryAction::Skipped => self.skipped += 1,
        }
    }
}

/// Runs the copy and rename passes for one set of job parameters.
#[derive(Clone)]
pub struct BatchTransformer {
    image_io: Arc<dyn ImageIo>,
    events: Option<EventBus>,
    job_id: JobId,
}

impl Default for BatchTransformer {
    fn default() -> Self {
        Self::new(Arc::new(NiftiIo))
    }
}

impl BatchTransformer {
    /// Transformer that converts volumes through `image_io` and publishes no events.
    #[must_use]
    pub fn new(image_io: Arc<dyn ImageIo>) -> Self {
        Self {
            image_io,
            events: None,
            job_id: Uuid::new_v4(),
        }
    }

    /// Publish step and entry events for `job_id` on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventBus, job_id: JobId) -> Self {
        self.events = Some(events);
        self.job_id = job_id;
        self
    }

    /// Identifier attached to published events.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Execute every step against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::InvalidInput`] before any I/O when validation
    /// fails, [`TransformError::SignalFileUnwritable`] when progress cannot be
    /// recorded, and [`TransformError::Io`] or [`TransformError::Image`] for the
    /// first entry that cannot be copied, converted, or renamed.
    #[instrument(name = "batch_transform", skip(self, params), fields(job_id = %self.job_id))]
    pub fn run(&self, params: &JobParameters) -> TransformResult<TransformSummary> {
        self.execute_step(StepKind::Validate, || Self::validate(params))?;
        let mut signal = self.execute_step(StepKind::ResetSignal, || {
            self.reset_signal(&params.signal_file)
        })?;
        let mut summary =
            self.execute_step(StepKind::CopyPass, || self.copy_pass(params, &mut signal))?;
        summary.renamed = self.execute_step(StepKind::RenamePass, || self.rename_pass(params))?;

        info!(
            processed = summary.processed,
            converted = summary.converted,
            copied = summary.copied,
            skipped = summary.skipped,
            renamed = summary.renamed,
            "batch transform finished"
        );
        Ok(summary)
    }

    fn validate(params: &JobParameters) -> TransformResult<((), StepOutcome)> {
        params.validate()?;
        if params.overwrite && params.dest_dir != params.source_dir {
            warn!(
                source = %params.source_dir.display(),
                dest = %params.dest_dir.display(),
                "overwrite requested but destination is not the source; renaming the destination as given"
            );
        }
        Ok(((), StepOutcome::Completed(None)))
    }

    fn reset_signal(&self, path: &Path) -> TransformResult<(SignalFile, StepOutcome)> {
        let signal = SignalFile::reset(path)?;
        self.publish(Event::ProgressReset {
            job_id: self.job_id,
        });
        let detail = format!("signal file {}", path.display());
        Ok((signal, StepOutcome::Completed(Some(detail))))
    }

    fn copy_pass(
        &self,
        params: &JobParameters,
        signal: &mut SignalFile,
    ) -> TransformResult<(TransformSummary, StepOutcome)> {
        let mut summary = TransformSummary::default();
        if params.overwrite {
            return Ok((
                summary,
                StepOutcome::Skipped(Some("overwrite mode renames in place".into())),
            ));
        }

        let entries = list_entries(&params.source_dir, "copy_pass.list_source")?;
        for (index, entry) in entries.iter().enumerate() {
            if index == 0 {
                fs::create_dir_all(&params.dest_dir).map_err(|source| {
                    TransformError::io("copy_pass.create_dest", &params.dest_dir, source)
                })?;
            }
            let action = self.copy_entry(entry, &params.dest_dir)?;
            summary.record(action);
            signal.append(index)?;
            debug!(index, name = %entry.name, action = action.as_str(), "entry processed");
            self.publish(Event::EntryProcessed {
                job_id: self.job_id,
                index,
                name: entry.name.clone(),
                action,
            });
        }

        let detail = format!(
            "{} entries: {} converted, {} copied, {} skipped",
            summary.processed, summary.converted, summary.copied, summary.skipped
        );
        Ok((summary, StepOutcome::Completed(Some(detail))))
    }

    fn copy_entry(&self, entry: &DirectoryEntry, dest_dir: &Path) -> TransformResult<EntryAction> {
        let target = dest_dir.join(&entry.file_name);
        match entry.kind() {
            EntryKind::Volume => {
                let image = self.image_io.read(&entry.path).map_err(|source| {
                    TransformError::image("copy_pass.read_volume", &entry.path, source)
                })?;
                self.image_io.write(&image, &target).map_err(|source| {
                    TransformError::image("copy_pass.write_volume", &target, source)
                })?;
                Ok(EntryAction::Converted)
            }
            EntryKind::Mesh => {
                copy_with_metadata(&entry.path, &target)?;
                Ok(EntryAction::Copied)
            }
            EntryKind::Other => Ok(EntryAction::Skipped),
        }
    }

    fn rename_pass(&self, params: &JobParameters) -> TransformResult<(usize, StepOutcome)> {
        if !params.overwrite && !params.dest_dir.exists() {
            warn!(
                dest = %params.dest_dir.display(),
                "destination was never created; nothing to rename"
            );
            return Ok((
                0,
                StepOutcome::Skipped(Some("destination not created".into())),
            ));
        }

        let entries = list_entries(&params.dest_dir, "rename_pass.list_dest")?;
        let mut renamed = 0;
        for entry in &entries {
            let Some(new_name) = replaced_name(&entry.file_name, &params.find, &params.replace)
            else {
                continue;
            };
            let target = params.dest_dir.join(&new_name);
            fs::rename(&entry.path, &target)
                .map_err(|source| TransformError::io("rename_pass.rename", &entry.path, source))?;
            renamed += 1;
            let new_name = new_name.to_string_lossy().into_owned();
            debug!(from = %entry.name, to = %new_name, "entry renamed");
            self.publish(Event::EntryRenamed {
                job_id: self.job_id,
                from: entry.name.clone(),
                to: new_name,
            });
        }
        Ok((
            renamed,
            StepOutcome::Completed(Some(format!("{renamed} entries renamed"))),
        ))
    }

    fn execute_step<T, F>(&self, step: StepKind, op: F) -> TransformResult<T>
    where
        F: FnOnce() -> TransformResult<(T, StepOutcome)>,
    {
        self.publish(Event::StepChanged {
            job_id: self.job_id,
            step: step.as_str().to_string(),
        });
        debug!(step = step.as_str(), "step started");

        match op() {
            Ok((value, outcome)) => {
                info!(
                    step = step.as_str(),
                    status = outcome.status(),
                    detail = outcome.detail().unwrap_or_default(),
                    "step finished"
                );
                Ok(value)
            }
            Err(err) => {
                error!(step = step.as_str(), error = %err, "step failed");
                Err(err)
            }
        }
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Copy `source` to `target` keeping permissions and access/modification times.
fn copy_with_metadata(source: &Path, target: &Path) -> TransformResult<()> {
    fs::copy(source, target)
        .map_err(|err| TransformError::io("copy_pass.copy_mesh", target, err))?;
    let meta = fs::metadata(source)
        .map_err(|err| TransformError::io("copy_pass.stat_mesh", source, err))?;
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
    .map_err(|err| TransformError::io("copy_pass.set_times", target, err))
}
