//! Readiness state machine for a managed execution environment.
//!
//! `Unknown -> Checked -> {Ready, NeedsBootstrap} -> Bootstrapping -> {Ready, Failed}`.
//! Each transition is a method; [`EnvironmentReadiness::drive`] chains them.

use std::sync::Arc;
use std::time::Instant;

use scanbatch_config::DispatchSettings;
use scanbatch_events::{Event, EventBus};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::environment::EnvironmentManager;
use crate::error::{DispatchError, DispatchResult, EnvironmentError};
use crate::job::BootstrapDecision;
use crate::paths::PathTranslator;

/// Where an environment sits in the readiness lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Nothing checked yet.
    Unknown,
    /// Host prerequisites passed and existence is known.
    Checked,
    /// The environment is missing and may be created.
    NeedsBootstrap,
    /// Creation is in progress.
    Bootstrapping,
    /// The requirements probe passed.
    Ready,
    /// A check, decision, or bootstrap stage failed.
    Failed,
}

impl ReadinessState {
    /// Lowercase label used in events and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Checked => "checked",
            Self::NeedsBootstrap => "needs_bootstrap",
            Self::Bootstrapping => "bootstrapping",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Drives one environment through the readiness lifecycle.
pub struct EnvironmentReadiness {
    manager: Arc<dyn EnvironmentManager>,
    settings: Arc<DispatchSettings>,
    events: EventBus,
    env_name: String,
    state: ReadinessState,
}

impl EnvironmentReadiness {
    /// Start in [`ReadinessState::Unknown`].
    #[must_use]
    pub fn new(
        manager: Arc<dyn EnvironmentManager>,
        settings: Arc<DispatchSettings>,
        events: EventBus,
        env_name: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            settings,
            events,
            env_name: env_name.into(),
            state: ReadinessState::Unknown,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReadinessState {
        self.state
    }

    /// Environment name.
    #[must_use]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Run every transition needed to reach `Ready`, asking `decision` before
    /// creating a missing environment.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnready`, `EnvironmentDeclined`, `BootstrapFailed`,
    /// or `Environment` depending on which transition failed.
    pub async fn drive(&mut self, decision: &dyn BootstrapDecision) -> DispatchResult<()> {
        if self.state == ReadinessState::Ready {
            return Ok(());
        }
        if self.check().await? {
            return self.verify().await;
        }
        self.request_bootstrap(decision).await?;
        self.bootstrap().await
    }

    /// Reach `Ready` or `NeedsBootstrap` without creating or changing anything.
    /// The probe runs once; the search path is never injected.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnready` or `Environment` when a check fails.
    pub async fn inspect(&mut self) -> DispatchResult<ReadinessState> {
        if !self.check().await? {
            self.transition(ReadinessState::NeedsBootstrap);
            return Ok(self.state);
        }
        let probed = self
            .manager
            .run_command(&self.env_name, &self.settings.probe_command)
            .await;
        let output = probed.map_err(|source| self.fail_environment("probe", source))?;
        if output.success() {
            self.transition(ReadinessState::Ready);
            Ok(self.state)
        } else {
            Err(self.fail_unready("requirements probe failed".to_string()))
        }
    }

    /// `Unknown -> Checked`: host prerequisites, then existence.
    /// Returns whether the environment exists.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnready` when a prerequisite is missing or cannot be
    /// checked, and `Environment` when the existence query fails.
    pub async fn check(&mut self) -> DispatchResult<bool> {
        let report = self.manager.check_host().await;
        let report = report.map_err(|source| {
            self.fail_unready(format!("host check failed: {}", source.detail()))
        })?;
        if let Some(reason) = report.failure_reason() {
            return Err(self.fail_unready(reason));
        }
        let exists = self.manager.exists(&self.env_name).await;
        let exists = exists.map_err(|source| self.fail_environment("exists", source))?;
        self.transition(ReadinessState::Checked);
        Ok(exists)
    }

    /// `Checked -> NeedsBootstrap`, then ask the caller.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentDeclined` when the caller says no.
    pub async fn request_bootstrap(&mut self, decision: &dyn BootstrapDecision) -> DispatchResult<()> {
        self.transition(ReadinessState::NeedsBootstrap);
        if decision.confirm(&self.env_name).await {
            return Ok(());
        }
        info!(env = %self.env_name, "environment bootstrap declined");
        self.transition(ReadinessState::Failed);
        Err(DispatchError::EnvironmentDeclined {
            env_name: self.env_name.clone(),
        })
    }

    /// `NeedsBootstrap -> Bootstrapping -> Ready | Failed`. Stages run on a
    /// spawned task; a heartbeat event is published every poll interval until
    /// it settles.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapFailed` naming the failed stage, or `Join` if the task
    /// panicked.
    pub async fn bootstrap(&mut self) -> DispatchResult<()> {
        self.transition(ReadinessState::Bootstrapping);
        let mut task = tokio::spawn(run_bootstrap_stages(
            Arc::clone(&self.manager),
            Arc::clone(&self.settings),
            self.env_name.clone(),
        ));

        let started = Instant::now();
        let mut ticker = interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = ticker.tick() => {
                    self.events.publish(Event::BootstrapProgress {
                        env_name: self.env_name.clone(),
                        elapsed_secs: started.elapsed().as_secs(),
                    });
                }
            }
        };

        match joined.map_err(|source| DispatchError::Join { source })? {
            Ok(()) => {
                info!(
                    env = %self.env_name,
                    elapsed_secs = started.elapsed().as_secs(),
                    "environment bootstrapped"
                );
                self.transition(ReadinessState::Ready);
                Ok(())
            }
            Err(err) => {
                warn!(env = %self.env_name, error = %err, "environment bootstrap failed");
                self.transition(ReadinessState::Failed);
                Err(err)
            }
        }
    }

    /// `Checked -> Ready`: probe, inject the search path once on failure,
    /// probe again.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnready` when the second probe fails too.
    pub async fn verify(&mut self) -> DispatchResult<()> {
        let probed =
            probe_with_remediation(self.manager.as_ref(), &self.settings, &self.env_name).await;
        let passed = probed.map_err(|source| self.fail_environment("verify", source))?;
        if passed {
            self.transition(ReadinessState::Ready);
            Ok(())
        } else {
            Err(self.fail_unready(unready_reason(&self.settings).to_string()))
        }
    }

    fn transition(&mut self, next: ReadinessState) {
        info!(
            env = %self.env_name,
            from = self.state.as_str(),
            to = next.as_str(),
            "environment state changed"
        );
        self.state = next;
        self.events.publish(Event::EnvironmentStateChanged {
            env_name: self.env_name.clone(),
            state: next.as_str().to_string(),
        });
    }

    fn fail_unready(&mut self, reason: String) -> DispatchError {
        warn!(env = %self.env_name, %reason, "environment not ready");
        self.transition(ReadinessState::Failed);
        DispatchError::EnvironmentUnready {
            env_name: self.env_name.clone(),
            reason,
        }
    }

    fn fail_environment(&mut self, operation: &'static str, source: EnvironmentError) -> DispatchError {
        warn!(env = %self.env_name, operation, detail = %source.detail(), "environment manager call failed");
        self.transition(ReadinessState::Failed);
        DispatchError::Environment { operation, source }
    }
}

fn unready_reason(settings: &DispatchSettings) -> &'static str {
    if settings.search_paths.is_empty() {
        "requirements probe failed and no search paths are configured"
    } else {
        "requirements probe failed after search path injection"
    }
}

/// Probe; on failure inject the search path and probe exactly once more.
/// With no search paths configured there is nothing to inject, and the
/// environment's variables are left alone.
async fn probe_with_remediation(
    manager: &dyn EnvironmentManager,
    settings: &DispatchSettings,
    env_name: &str,
) -> Result<bool, EnvironmentError> {
    if manager.run_command(env_name, &settings.probe_command).await?.success() {
        return Ok(true);
    }
    let value = PathTranslator::from_settings(settings).search_path_value(&settings.search_paths);
    if value.is_empty() {
        warn!(env = env_name, "probe failed; no search paths to inject");
        return Ok(false);
    }
    info!(env = env_name, key = %settings.search_path_key, "probe failed; injecting search path");
    manager
        .set_path_variable(env_name, &settings.search_path_key, &value)
        .await?;
    Ok(manager
        .run_command(env_name, &settings.probe_command)
        .await?
        .success())
}

async fn run_bootstrap_stages(
    manager: Arc<dyn EnvironmentManager>,
    settings: Arc<DispatchSettings>,
    env_name: String,
) -> DispatchResult<()> {
    let failed = |stage: &'static str, detail: String| DispatchError::BootstrapFailed {
        env_name: env_name.clone(),
        stage,
        detail,
    };

    manager
        .create(&env_name, &settings.python_version)
        .await
        .map_err(|err| failed("create", err.detail()))?;

    if settings.packages.is_empty() {
        info!(env = %env_name, "no packages to install");
    } else {
        manager
            .install_packages(&env_name, &settings.packages)
            .await
            .map_err(|err| failed("install_packages", err.detail()))?;
    }

    let passed = probe_with_remediation(manager.as_ref(), &settings, &env_name)
        .await
        .map_err(|err| failed("verify", err.detail()))?;
    if passed {
        Ok(())
    } else {
        Err(failed("verify", unready_reason(&settings).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HostReport;
    use crate::job::FixedDecision;
    use crate::testing::MockEnvironment;
    use std::time::Duration;

    fn settings() -> Arc<DispatchSettings> {
        Arc::new(DispatchSettings {
            poll_interval_ms: 5,
            search_paths: vec!["/opt/tools/bin".into()],
            ..DispatchSettings::default()
        })
    }

    fn readiness(mock: &Arc<MockEnvironment>, events: &EventBus) -> EnvironmentReadiness {
        EnvironmentReadiness::new(
            Arc::clone(mock) as Arc<dyn EnvironmentManager>,
            settings(),
            events.clone(),
            "scanbatch",
        )
    }

    fn state_labels(events: &EventBus) -> Vec<String> {
        events
            .subscribe(Some(0))
            .drain_ready()
            .into_iter()
            .filter_map(|envelope| match envelope.event {
                Event::EnvironmentStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn existing_environment_with_passing_probe_is_ready() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::existing());
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        readiness.drive(&FixedDecision(false)).await?;
        assert_eq!(readiness.state(), ReadinessState::Ready);
        assert_eq!(mock.log.count("run_command"), 1);
        assert_eq!(mock.log.count("set_path_variable"), 0);
        assert_eq!(state_labels(&events), ["checked", "ready"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_probe_injects_search_path_exactly_once() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        mock.script_exit("scanbatch --version", 0);
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        readiness.drive(&FixedDecision(false)).await?;
        assert_eq!(readiness.state(), ReadinessState::Ready);
        assert_eq!(mock.log.count("run_command"), 2);
        assert_eq!(
            mock.log.calls()[3],
            "set_path_variable scanbatch PYTHONPATH=/opt/tools/bin"
        );
        Ok(())
    }

    #[tokio::test]
    async fn second_probe_failure_is_unready() {
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        let err = readiness.drive(&FixedDecision(true)).await;
        assert!(matches!(err, Err(DispatchError::EnvironmentUnready { .. })));
        assert_eq!(readiness.state(), ReadinessState::Failed);
        assert_eq!(mock.log.count("run_command"), 2);
        assert_eq!(mock.log.count("set_path_variable"), 1);
        assert_eq!(mock.log.count("create"), 0);
    }

    #[tokio::test]
    async fn unmet_host_prerequisite_stops_before_existence_check() {
        let mock = Arc::new(MockEnvironment::existing().with_host(HostReport {
            launcher_available: true,
            missing_packages: vec!["libgl1-mesa-glx".into()],
            manager_available: true,
        }));
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        match readiness.check().await {
            Err(DispatchError::EnvironmentUnready { reason, .. }) => {
                assert_eq!(reason, "missing system packages: libgl1-mesa-glx");
            }
            other => panic!("expected unready, got {other:?}"),
        }
        assert_eq!(mock.log.calls(), ["check_host"]);
    }

    #[tokio::test]
    async fn host_check_failure_keeps_the_real_cause() {
        let mock = Arc::new(MockEnvironment::existing());
        mock.fail("check_host", "dpkg: error: dpkg database is locked");
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        match readiness.check().await {
            Err(DispatchError::EnvironmentUnready { reason, .. }) => {
                assert_eq!(
                    reason,
                    "host check failed: conda exited with 1: dpkg: error: dpkg database is locked"
                );
            }
            other => panic!("expected unready, got {other:?}"),
        }
        assert_eq!(readiness.state(), ReadinessState::Failed);
        assert_eq!(mock.log.calls(), ["check_host"]);
    }

    #[tokio::test]
    async fn declined_bootstrap_creates_nothing() {
        let mock = Arc::new(MockEnvironment::new());
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        let err = readiness.drive(&FixedDecision(false)).await;
        assert!(matches!(err, Err(DispatchError::EnvironmentDeclined { .. })));
        assert_eq!(mock.log.count("create"), 0);
        assert_eq!(
            state_labels(&events),
            ["checked", "needs_bootstrap", "failed"]
        );
    }

    #[tokio::test]
    async fn accepted_bootstrap_runs_stages_and_reports_heartbeats() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::new().with_create_delay(Duration::from_millis(40)));
        let events = EventBus::new();
        let mut readiness = readiness(&mock, &events);

        readiness.drive(&FixedDecision(true)).await?;
        assert_eq!(readiness.state(), ReadinessState::Ready);
        assert_eq!(mock.log.count("create scanbatch python=3.9"), 1);
        // No packages configured, so the install stage is skipped.
        assert_eq!(mock.log.count("install_packages"), 0);
        assert_eq!(
            state_labels(&events),
            ["checked", "needs_bootstrap", "bootstrapping", "ready"]
        );
        let heartbeats = events
            .subscribe(Some(0))
            .drain_ready()
            .iter()
            .filter(|envelope| matches!(envelope.event, Event::BootstrapProgress { .. }))
            .count();
        assert!(heartbeats >= 1);
        Ok(())
    }

    #[tokio::test]
    async fn install_failure_names_the_stage() {
        let mock = Arc::new(MockEnvironment::new());
        mock.fail("install_packages", "PackagesNotFoundError: vtkk");
        let settings = Arc::new(DispatchSettings {
            packages: vec!["vtkk".into()],
            poll_interval_ms: 5,
            ..DispatchSettings::default()
        });
        let mut readiness = EnvironmentReadiness::new(
            Arc::clone(&mock) as Arc<dyn EnvironmentManager>,
            settings,
            EventBus::new(),
            "scanbatch",
        );

        match readiness.drive(&FixedDecision(true)).await {
            Err(DispatchError::BootstrapFailed { stage, detail, .. }) => {
                assert_eq!(stage, "install_packages");
                assert!(detail.contains("PackagesNotFoundError"));
            }
            other => panic!("expected bootstrap failure, got {other:?}"),
        }
        assert_eq!(readiness.state(), ReadinessState::Failed);
        assert_eq!(mock.log.count("run_command"), 0);
    }

    #[tokio::test]
    async fn default_settings_never_write_the_search_path() {
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        mock.script_exit("scanbatch --version", 0);
        let settings = Arc::new(DispatchSettings {
            poll_interval_ms: 5,
            ..DispatchSettings::default()
        });
        let mut readiness = EnvironmentReadiness::new(
            Arc::clone(&mock) as Arc<dyn EnvironmentManager>,
            settings,
            EventBus::new(),
            "scanbatch",
        );

        match readiness.drive(&FixedDecision(false)).await {
            Err(DispatchError::EnvironmentUnready { reason, .. }) => {
                assert_eq!(
                    reason,
                    "requirements probe failed and no search paths are configured"
                );
            }
            other => panic!("expected unready, got {other:?}"),
        }
        assert_eq!(mock.log.count("set_path_variable"), 0);
        assert_eq!(mock.log.count("run_command"), 1);
    }

    #[tokio::test]
    async fn bootstrap_verify_skips_injection_without_search_paths() {
        let mock = Arc::new(MockEnvironment::new());
        mock.script_exit("scanbatch --version", 1);
        let settings = Arc::new(DispatchSettings {
            poll_interval_ms: 5,
            ..DispatchSettings::default()
        });
        let mut readiness = EnvironmentReadiness::new(
            Arc::clone(&mock) as Arc<dyn EnvironmentManager>,
            settings,
            EventBus::new(),
            "scanbatch",
        );

        match readiness.drive(&FixedDecision(true)).await {
            Err(DispatchError::BootstrapFailed { stage, .. }) => assert_eq!(stage, "verify"),
            other => panic!("expected bootstrap failure, got {other:?}"),
        }
        assert_eq!(mock.log.count("set_path_variable"), 0);
    }

    #[tokio::test]
    async fn inspect_probes_once_without_injecting() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::existing());
        mock.script_exit("scanbatch --version", 1);
        let mut readiness = readiness(&mock, &EventBus::new());

        let err = readiness.inspect().await;
        assert!(matches!(err, Err(DispatchError::EnvironmentUnready { .. })));
        assert_eq!(mock.log.count("run_command"), 1);
        assert_eq!(mock.log.count("set_path_variable"), 0);

        let mock = Arc::new(MockEnvironment::existing());
        let mut readiness = self::readiness(&mock, &EventBus::new());
        assert_eq!(readiness.inspect().await?, ReadinessState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn inspect_reports_missing_environment_without_creating() -> anyhow::Result<()> {
        let mock = Arc::new(MockEnvironment::new());
        let mut readiness = readiness(&mock, &EventBus::new());
        assert_eq!(readiness.inspect().await?, ReadinessState::NeedsBootstrap);
        assert_eq!(mock.log.count("create"), 0);
        Ok(())
    }
}
