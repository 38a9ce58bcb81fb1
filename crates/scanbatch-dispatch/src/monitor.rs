//! Progress and completion polling.
//!
//! Local runs tick through `EntryProcessed` events, positioned by entry index
//! so events a lagging subscriber missed are still counted; remote runs tick
//! whenever the signal file's modification time changes. Both feed a
//! [`ProgressCounter`], so snapshots read the same in either mode.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use filetime::FileTime;
use scanbatch_events::{Event, EventStream, JobId, ProgressCounter};
use scanbatch_transform::read_mtime;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::error::DispatchResult;
use crate::job::{JobHandle, JobResult};

/// Samples a signal file's modification time.
#[derive(Debug)]
pub struct SignalWatcher {
    path: PathBuf,
    last_seen: Option<FileTime>,
}

impl SignalWatcher {
    /// Watch `path`, using its current mtime (if any) as the baseline.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_seen: read_mtime(path).ok().flatten(),
        }
    }

    /// Returns `true` when the mtime differs from the last observation.
    pub fn poll(&mut self) -> bool {
        match read_mtime(&self.path) {
            Ok(Some(mtime)) if Some(mtime) != self.last_seen => {
                self.last_seen = Some(mtime);
                true
            }
            Ok(_) => false,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "signal file unreadable");
                false
            }
        }
    }
}

/// Where progress ticks come from.
pub enum TickSource {
    /// Progress events for one job on the bus.
    Events {
        /// Subscription opened before the job started.
        stream: EventStream,
        /// Job whose events count.
        job_id: JobId,
        /// Ticks implied by the events seen so far.
        seen: usize,
    },
    /// Modification-time changes of a signal file.
    Signal(SignalWatcher),
}

impl TickSource {
    /// Tick source fed by `job_id`'s events on `stream`.
    #[must_use]
    pub const fn events(stream: EventStream, job_id: JobId) -> Self {
        Self::Events {
            stream,
            job_id,
            seen: 0,
        }
    }

    /// Ticks observed since the previous call.
    ///
    /// The reset is one tick and entry `index` implies `index + 2`, matching
    /// one signal-file write per step.
    pub fn collect(&mut self) -> usize {
        match self {
            Self::Events {
                stream,
                job_id,
                seen,
            } => {
                let before = *seen;
                for envelope in stream.drain_ready() {
                    if envelope.event.job_id() != Some(*job_id) {
                        continue;
                    }
                    match envelope.event {
                        Event::ProgressReset { .. } => *seen = (*seen).max(1),
                        Event::EntryProcessed { index, .. } => *seen = (*seen).max(index + 2),
                        _ => {}
                    }
                }
                *seen - before
            }
            Self::Signal(watcher) => usize::from(watcher.poll()),
        }
    }
}

/// One progress reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Entries shown as processed.
    pub processed: usize,
    /// Entries counted at dispatch time.
    pub total: usize,
    /// Percent complete, two decimals, capped at 100.
    pub percent: f64,
    /// Time since monitoring started.
    pub elapsed: Duration,
    /// Whether the run has finished successfully.
    pub finished: bool,
}

/// Merges completion, ticks, and elapsed time into snapshots.
pub struct JobMonitor {
    counter: ProgressCounter,
    ticks: Option<TickSource>,
    started: Instant,
}

impl JobMonitor {
    /// Monitor a run of `total` entries.
    #[must_use]
    pub fn new(total: usize, ticks: Option<TickSource>) -> Self {
        Self {
            counter: ProgressCounter::new(total),
            ticks,
            started: Instant::now(),
        }
    }

    /// Collect pending ticks and report.
    pub fn poll(&mut self) -> ProgressSnapshot {
        if let Some(ticks) = self.ticks.as_mut() {
            for _ in 0..ticks.collect() {
                self.counter.record_tick();
            }
        }
        self.snapshot()
    }

    /// Report full completion.
    pub fn finish(&mut self) -> ProgressSnapshot {
        self.counter.finish();
        self.snapshot()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.counter.processed(),
            total: self.counter.total(),
            percent: self.counter.percent(),
            elapsed: self.started.elapsed(),
            finished: self.counter.is_finished(),
        }
    }

    /// Poll `handle` every `poll_interval` until it finishes, reporting each
    /// snapshot to `on_update`. A successful run ends with a full snapshot.
    ///
    /// # Errors
    ///
    /// Returns the error the run produced.
    pub async fn follow<F>(
        mut handle: JobHandle,
        poll_interval: Duration,
        mut on_update: F,
    ) -> DispatchResult<(JobResult, ProgressSnapshot)>
    where
        F: FnMut(&ProgressSnapshot),
    {
        let mut monitor = Self::new(handle.total_entries(), handle.take_ticks());
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !handle.is_finished() {
            ticker.tick().await;
            on_update(&monitor.poll());
        }

        let result = handle.wait().await?;
        let last = if result.is_success() {
            monitor.finish()
        } else {
            monitor.poll()
        };
        on_update(&last);
        Ok((result, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanbatch_events::{EntryAction, EventBus};
    use scanbatch_transform::SignalFile;
    use uuid::Uuid;

    #[test]
    fn watcher_ticks_once_per_mtime_change() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("progress.txt");
        let mut watcher = SignalWatcher::new(&path);
        assert!(!watcher.poll());

        let mut signal = SignalFile::reset(&path)?;
        assert!(watcher.poll());
        assert!(!watcher.poll());

        signal.append(0)?;
        assert!(watcher.poll());
        signal.append(1)?;
        signal.append(2)?;
        // Several appends between polls read as one tick.
        assert!(watcher.poll());
        assert!(!watcher.poll());
        Ok(())
    }

    #[test]
    fn event_ticks_only_count_the_watched_job() {
        let bus = EventBus::with_capacity(32);
        let job_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut monitor = JobMonitor::new(
            4,
            Some(TickSource::events(bus.subscribe(None), job_id)),
        );

        bus.publish(Event::ProgressReset { job_id });
        for (index, id) in [(0, job_id), (0, other), (5, other), (1, job_id)] {
            bus.publish(Event::EntryProcessed {
                job_id: id,
                index,
                name: format!("e{index}"),
                action: EntryAction::Copied,
            });
        }
        bus.publish(Event::StepChanged {
            job_id,
            step: "rename_pass".into(),
        });

        let snapshot = monitor.poll();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.total, 4);
        assert!((snapshot.percent - 50.0).abs() < f64::EPSILON);
        assert!(!snapshot.finished);

        let done = monitor.finish();
        assert_eq!(done.processed, 4);
        assert!((done.percent - 100.0).abs() < f64::EPSILON);
        assert!(done.finished);
    }

    #[test]
    fn lagging_subscriber_still_counts_missed_entries() {
        let bus = EventBus::with_capacity(4);
        let job_id = Uuid::new_v4();
        let mut monitor = JobMonitor::new(20, Some(TickSource::events(bus.subscribe(None), job_id)));

        bus.publish(Event::ProgressReset { job_id });
        for index in 0..10 {
            bus.publish(Event::EntryProcessed {
                job_id,
                index,
                name: format!("e{index}"),
                action: EntryAction::Converted,
            });
        }

        let snapshot = monitor.poll();
        assert_eq!(snapshot.processed, 10);
        assert!((snapshot.percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(monitor.poll().processed, 10);
    }

    #[test]
    fn signal_ticks_feed_the_counter() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("progress.txt");
        let mut monitor = JobMonitor::new(2, Some(TickSource::Signal(SignalWatcher::new(&path))));

        let mut signal = SignalFile::reset(&path)?;
        assert_eq!(monitor.poll().processed, 0);
        signal.append(0)?;
        let snapshot = monitor.poll();
        assert_eq!(snapshot.processed, 1);
        assert!((snapshot.percent - 50.0).abs() < f64::EPSILON);
        Ok(())
    }
}
