//! Job dispatch: local in-process runs and remote runs inside a managed
//! environment.
//!
//! # Design
//! - Both modes return a [`JobHandle`] immediately; the run executes on a
//!   background unit that is never cancelled once started.
//! - Local runs report progress on the event bus; remote runs are observed
//!   through the signal file's modification time.
//! - Readiness is driven to `Ready` before a remote worker is launched.

use std::path::PathBuf;
use std::sync::Arc;

use scanbatch_config::{DispatchSettings, JobParameters};
use scanbatch_events::{Event, EventBus, JobId};
use scanbatch_telemetry::job_span;
use scanbatch_transform::{BatchTransformer, ImageIo, NiftiIo, count_entries};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::environment::EnvironmentManager;
use crate::error::{DispatchError, DispatchResult};
use crate::job::{BootstrapDecision, DispatchMode, JobHandle, JobResult};
use crate::monitor::{SignalWatcher, TickSource};
use crate::paths::PathTranslator;
use crate::state::{EnvironmentReadiness, ReadinessState};

/// Full worker invocation for `params`: the configured worker command followed
/// by the six positional job arguments, with paths translated for the launcher.
#[must_use]
pub fn worker_argv(settings: &DispatchSettings, params: &JobParameters) -> Vec<String> {
    let translator = PathTranslator::from_settings(settings);
    let translated = params.with_translated_paths(|path| translator.translate(path));
    let mut argv = settings.worker_command.clone();
    argv.extend(translated.to_worker_args());
    argv
}

/// Entry point for starting batch runs.
pub struct JobDispatcher {
    manager: Arc<dyn EnvironmentManager>,
    settings: Arc<DispatchSettings>,
    events: EventBus,
    image_io: Arc<dyn ImageIo>,
}

impl JobDispatcher {
    /// Dispatcher using the NIfTI image adapter for local runs.
    #[must_use]
    pub fn new(
        manager: Arc<dyn EnvironmentManager>,
        settings: DispatchSettings,
        events: EventBus,
    ) -> Self {
        Self {
            manager,
            settings: Arc::new(settings),
            events,
            image_io: Arc::new(NiftiIo),
        }
    }

    /// Replace the image adapter used by local runs.
    #[must_use]
    pub fn with_image_io(mut self, image_io: Arc<dyn ImageIo>) -> Self {
        self.image_io = image_io;
        self
    }

    /// Bus carrying job and environment events.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Settings the dispatcher was built with.
    #[must_use]
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Fresh readiness state machine for `env_name`.
    #[must_use]
    pub fn readiness(&self, env_name: &str) -> EnvironmentReadiness {
        EnvironmentReadiness::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.settings),
            self.events.clone(),
            env_name,
        )
    }

    /// Validate `params`, count the source entries, and start the run.
    ///
    /// Remote runs first drive the environment to `Ready`, asking `decision`
    /// before creating a missing one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad parameters, `Transform` when the source
    /// cannot be listed, and readiness errors for remote runs. Failures of the
    /// run itself are reported through the handle.
    pub async fn dispatch(
        &self,
        params: JobParameters,
        mode: &DispatchMode,
        decision: &dyn BootstrapDecision,
    ) -> DispatchResult<JobHandle> {
        params.validate()?;
        let total_entries = count_entries(&params.source_dir)?;
        let job_id = Uuid::new_v4();
        info!(
            %job_id,
            mode = mode.as_str(),
            source = %params.source_dir.display(),
            total_entries,
            "dispatching batch run"
        );
        match mode {
            DispatchMode::Local => Ok(self.dispatch_local(job_id, params, total_entries)),
            DispatchMode::Remote(env_name) => {
                self.dispatch_remote(job_id, params, total_entries, env_name, decision)
                    .await
            }
        }
    }

    fn dispatch_local(&self, job_id: JobId, params: JobParameters, total_entries: usize) -> JobHandle {
        // Subscribe before the first event so no tick is missed.
        let stream = self.events.subscribe(None);
        self.publish_started(job_id, &params, total_entries);

        let transformer = BatchTransformer::new(Arc::clone(&self.image_io))
            .with_events(self.events.clone(), job_id);
        let events = self.events.clone();
        let span = job_span(job_id, DispatchMode::Local.as_str());
        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let result = match transformer.run(&params) {
                Ok(summary) => {
                    events.publish(Event::JobCompleted { job_id });
                    JobResult::Local {
                        success: true,
                        error: None,
                        summary: Some(summary),
                    }
                }
                Err(err) => {
                    let message = err.detail();
                    warn!(error = %message, "local batch run failed");
                    events.publish(Event::JobFailed {
                        job_id,
                        message: message.clone(),
                    });
                    JobResult::Local {
                        success: false,
                        error: Some(message),
                        summary: None,
                    }
                }
            };
            Ok(result)
        });

        JobHandle::new(job_id, total_entries, TickSource::events(stream, job_id), task)
    }

    async fn dispatch_remote(
        &self,
        job_id: JobId,
        params: JobParameters,
        total_entries: usize,
        env_name: &str,
        decision: &dyn BootstrapDecision,
    ) -> DispatchResult<JobHandle> {
        self.readiness(env_name).drive(decision).await?;

        let argv = worker_argv(&self.settings, &params);
        let watcher = SignalWatcher::new(&params.signal_file);
        self.publish_started(job_id, &params, total_entries);

        let manager = Arc::clone(&self.manager);
        let events = self.events.clone();
        let env_name = env_name.to_string();
        let span = job_span(job_id, "remote");
        let task = tokio::spawn(
            async move {
                let output = match manager.run_command(&env_name, &argv).await {
                    Ok(output) => output,
                    Err(source) => {
                        events.publish(Event::JobFailed {
                            job_id,
                            message: source.detail(),
                        });
                        return Err(DispatchError::Environment {
                            operation: "run_worker",
                            source,
                        });
                    }
                };
                if output.success() {
                    events.publish(Event::JobCompleted { job_id });
                } else {
                    warn!(exit_code = ?output.exit_code, "remote worker failed");
                    events.publish(Event::JobFailed {
                        job_id,
                        message: output.stderr.trim().to_string(),
                    });
                }
                Ok(JobResult::Remote {
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            .instrument(span),
        );

        Ok(JobHandle::new(
            job_id,
            total_entries,
            TickSource::Signal(watcher),
            task,
        ))
    }

    fn publish_started(&self, job_id: JobId, params: &JobParameters, total_entries: usize) {
        self.events.publish(Event::JobStarted {
            job_id,
            source_dir: params.source_dir.display().to_string(),
            total_entries,
        });
    }

    /// Report whether `env_name` is `Ready` or `NeedsBootstrap` without
    /// creating it or changing its variables.
    ///
    /// # Errors
    ///
    /// Returns readiness errors when a check or the probe fails.
    pub async fn environment_status(&self, env_name: &str) -> DispatchResult<ReadinessState> {
        self.readiness(env_name).inspect().await
    }

    /// Create `env_name` if it is missing, then verify it.
    ///
    /// # Errors
    ///
    /// Returns readiness errors when a check, stage, or the probe fails.
    pub async fn bootstrap_environment(&self, env_name: &str) -> DispatchResult<ReadinessState> {
        let mut readiness = self.readiness(env_name);
        if readiness.check().await? {
            info!(env = env_name, "environment already exists; verifying");
            readiness.verify().await?;
        } else {
            readiness.bootstrap().await?;
        }
        Ok(readiness.state())
    }

    /// Interpreter path inside `env_name`.
    ///
    /// # Errors
    ///
    /// Returns `Environment` when the manager cannot resolve it.
    pub async fn interpreter_path(&self, env_name: &str) -> DispatchResult<PathBuf> {
        self.manager
            .resolve_interpreter_path(env_name)
            .await
            .map_err(|source| DispatchError::Environment {
                operation: "resolve_interpreter_path",
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FixedDecision;
    use crate::monitor::JobMonitor;
    use crate::testing::MockEnvironment;
    use scanbatch_config::LauncherSettings;
    use scanbatch_test_support::fixtures::{sample_batch_tree, sorted_names};
    use std::time::Duration;

    fn dispatcher(mock: &Arc<MockEnvironment>, settings: DispatchSettings) -> JobDispatcher {
        JobDispatcher::new(
            Arc::clone(mock) as Arc<dyn EnvironmentManager>,
            settings,
            EventBus::new(),
        )
    }

    fn fast_settings() -> DispatchSettings {
        DispatchSettings {
            poll_interval_ms: 5,
            search_paths: vec!["/opt/tools/lib".into()],
            ..DispatchSettings::default()
        }
    }

    fn remote() -> DispatchMode {
        DispatchMode::Remote("scanbatch".into())
    }

    #[test]
    fn worker_argv_translates_drive_paths_for_wsl() {
        let settings = DispatchSettings {
            launcher: LauncherSettings::Wsl {
                user: "root".into(),
            },
            ..DispatchSettings::default()
        };
        let params = JobParameters::copy_into(
            r"C:\scans\in",
            r"D:\scans\out",
            "subj",
            "anon",
            r"C:\Temp\progress.txt",
        );
        assert_eq!(
            worker_argv(&settings, &params),
            [
                "scanbatch",
                "run",
                "/mnt/c/scans/in",
                "subj",
                "anon",
                "/mnt/d/scans/out",
                "False",
                "/mnt/c/Temp/progress.txt",
            ]
        );
    }

    #[tokio::test]
    async fn local_run_reports_progress_and_completes() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::new());
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );

        let handle = dispatcher
            .dispatch(params, &DispatchMode::Local, &FixedDecision(false))
            .await?;
        assert_eq!(handle.total_entries(), 3);

        let mut snapshots = Vec::new();
        let (result, last) =
            JobMonitor::follow(handle, Duration::from_millis(5), |snapshot| {
                snapshots.push(*snapshot);
            })
            .await?;

        assert!(result.is_success());
        assert!(last.finished);
        assert_eq!(last.processed, 3);
        assert!((last.percent - 100.0).abs() < f64::EPSILON);
        assert!(
            snapshots
                .windows(2)
                .all(|pair| pair[0].processed <= pair[1].processed)
        );
        assert_eq!(
            sorted_names(&tree.dest)?,
            ["anon_mesh.vtk", "anon_scan.nii"]
        );
        // Local runs never touch the environment manager.
        assert!(mock.log.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_any_work() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::existing());
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(&tree.source, &tree.dest, "", "anon", &tree.signal);

        let err = dispatcher.dispatch(params, &remote(), &FixedDecision(true)).await;
        assert!(matches!(err, Err(DispatchError::InvalidInput { field: "find", .. })));
        assert!(mock.log.calls().is_empty());
        assert!(!tree.signal.exists());
        Ok(())
    }

    #[tokio::test]
    async fn ready_environment_launches_worker_with_job_arguments() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::existing());
        let settings = fast_settings();
        let dispatcher = dispatcher(&mock, settings.clone());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );
        let expected = format!("run_command scanbatch {}", worker_argv(&settings, &params).join(" "));

        let handle = dispatcher.dispatch(params, &remote(), &FixedDecision(false)).await?;
        let job_id = handle.job_id();
        let result = handle.wait().await?;

        assert!(result.is_success());
        assert_eq!(mock.log.calls().last(), Some(&expected));
        let kinds: Vec<&str> = dispatcher
            .events()
            .subscribe(Some(0))
            .drain_ready()
            .iter()
            .filter(|envelope| envelope.event.job_id() == Some(job_id))
            .map(|envelope| envelope.event.kind())
            .collect();
        assert_eq!(kinds, ["job_started", "job_completed"]);
        Ok(())
    }

    #[tokio::test]
    async fn unready_environment_never_launches_worker() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );

        let err = dispatcher.dispatch(params, &remote(), &FixedDecision(true)).await;
        assert!(matches!(err, Err(DispatchError::EnvironmentUnready { .. })));
        assert_eq!(mock.log.count("run_command scanbatch scanbatch --version"), 2);
        assert_eq!(mock.log.count("set_path_variable"), 1);
        assert_eq!(mock.log.count("run_command scanbatch scanbatch run"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn remediated_environment_launches_worker() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        mock.script_exit("scanbatch --version", 0);
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );

        let handle = dispatcher.dispatch(params, &remote(), &FixedDecision(false)).await?;
        assert!(handle.wait().await?.is_success());
        assert_eq!(mock.log.count("set_path_variable"), 1);
        assert_eq!(mock.log.count("run_command scanbatch scanbatch run"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn declined_bootstrap_aborts_dispatch() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::new());
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );

        let err = dispatcher.dispatch(params, &remote(), &FixedDecision(false)).await;
        assert!(matches!(err, Err(DispatchError::EnvironmentDeclined { .. })));
        assert_eq!(mock.log.count("create"), 0);
        assert_eq!(mock.log.count("run_command"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_worker_is_reported_through_the_handle() -> anyhow::Result<()> {
        let tree = sample_batch_tree()?;
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch run", 1);
        let dispatcher = dispatcher(&mock, fast_settings());
        let params = JobParameters::copy_into(
            &tree.source,
            &tree.dest,
            "subj01",
            "anon",
            &tree.signal,
        );

        let handle = dispatcher.dispatch(params, &remote(), &FixedDecision(false)).await?;
        let (result, last) = JobMonitor::follow(handle, Duration::from_millis(5), |_| {}).await?;
        match result {
            JobResult::Remote {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.starts_with("error:"));
            }
            JobResult::Local { .. } => panic!("expected a remote result"),
        }
        assert!(!last.finished);
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_environment_creates_missing_environment() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::new());
        let dispatcher = dispatcher(&mock, fast_settings());
        assert_eq!(
            dispatcher.environment_status("scanbatch").await?,
            ReadinessState::NeedsBootstrap
        );
        assert_eq!(
            dispatcher.bootstrap_environment("scanbatch").await?,
            ReadinessState::Ready
        );
        assert_eq!(mock.log.count("create"), 1);
        assert_eq!(
            dispatcher.environment_status("scanbatch").await?,
            ReadinessState::Ready
        );
        assert_eq!(
            dispatcher.interpreter_path("scanbatch").await?,
            PathBuf::from("/opt/conda/envs/scanbatch/bin/python")
        );
        Ok(())
    }
}
