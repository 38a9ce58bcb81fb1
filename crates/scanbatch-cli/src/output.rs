//! Output renderers and formatting helpers for CLI commands.

use std::time::Duration;

use scanbatch_dispatch::{ProgressSnapshot, ReadinessState};
use scanbatch_events::{Event, EventBus};
use scanbatch_telemetry::format_elapsed;
use scanbatch_transform::TransformSummary;
use tokio::task::JoinHandle;

pub(crate) fn progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Number of processed files: {}/{}  {:.2}%  {}",
        snapshot.processed,
        snapshot.total,
        snapshot.percent,
        format_elapsed(snapshot.elapsed)
    )
}

pub(crate) fn summary_line(summary: &TransformSummary) -> String {
    format!(
        "processed {} entries: {} converted, {} copied, {} skipped; {} renamed",
        summary.processed, summary.converted, summary.copied, summary.skipped, summary.renamed
    )
}

pub(crate) fn readiness_line(env_name: &str, state: ReadinessState) -> String {
    let label = match state {
        ReadinessState::Ready => "ready",
        ReadinessState::NeedsBootstrap => "missing (run `scanbatch env bootstrap` to create it)",
        other => other.as_str(),
    };
    format!("environment '{env_name}': {label}")
}

fn bootstrap_line(env_name: &str, elapsed_secs: u64) -> String {
    format!(
        "Bootstrapping environment '{env_name}'... {}",
        format_elapsed(Duration::from_secs(elapsed_secs))
    )
}

/// Prints one line per progress snapshot, skipping repeats.
#[derive(Default)]
pub(crate) struct ProgressPrinter {
    last: Option<String>,
}

impl ProgressPrinter {
    pub(crate) fn update(&mut self, snapshot: &ProgressSnapshot) {
        let line = progress_line(snapshot);
        if self.last.as_deref() != Some(line.as_str()) {
            println!("{line}");
            self.last = Some(line);
        }
    }
}

/// Echo environment bootstrap heartbeats to stderr until aborted.
pub(crate) fn spawn_environment_reporter(events: &EventBus) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        let mut last_secs = None;
        while let Some(envelope) = stream.next().await {
            match envelope.event {
                Event::BootstrapProgress {
                    env_name,
                    elapsed_secs,
                } if last_secs != Some(elapsed_secs) => {
                    last_secs = Some(elapsed_secs);
                    eprintln!("{}", bootstrap_line(&env_name, elapsed_secs));
                }
                Event::EnvironmentStateChanged { env_name, state } if state == "bootstrapping" => {
                    eprintln!("Creating environment '{env_name}'; this can take several minutes.");
                }
                _ => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_matches_progress_bar_text() {
        let snapshot = ProgressSnapshot {
            processed: 3,
            total: 10,
            percent: 30.0,
            elapsed: Duration::from_secs(65),
            finished: false,
        };
        assert_eq!(
            progress_line(&snapshot),
            "Number of processed files: 3/10  30.00%  Time: 1min 5s"
        );
    }

    #[test]
    fn readiness_and_bootstrap_lines() {
        assert_eq!(
            readiness_line("scanbatch", ReadinessState::Ready),
            "environment 'scanbatch': ready"
        );
        assert!(readiness_line("scanbatch", ReadinessState::NeedsBootstrap).contains("missing"));
        assert_eq!(
            bootstrap_line("scanbatch", 59),
            "Bootstrapping environment 'scanbatch'... Time: 59s"
        );
    }

    #[test]
    fn summary_line_lists_counts() {
        let summary = TransformSummary {
            processed: 3,
            copied: 1,
            converted: 1,
            skipped: 1,
            renamed: 2,
        };
        assert_eq!(
            summary_line(&summary),
            "processed 3 entries: 1 converted, 1 copied, 1 skipped; 2 renamed"
        );
    }
}
