//! Timer-driven execution of schedules.
//!
//! Each active schedule gets one timer task. Every tick spawns a fire task so
//! a slow collector never delays the timer. A per-schedule run flag keeps at
//! most one run in flight; a tick that finds the flag set is skipped, not
//! queued.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fanout::{self, SharedSinks};
use super::status::ScheduleStatus;
use crate::plugin::{MIN_INTERVAL_SECS, Schedule, Source};

#[derive(Debug, Default)]
struct RunStats {
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_errors: u32,
    total_runs: u64,
    total_failures: u64,
    skipped: u64,
}

/// A started schedule and its mutable run state.
pub(crate) struct ActiveSchedule {
    schedule: Schedule,
    source: String,
    running: AtomicBool,
    stats: Mutex<RunStats>,
}

/// Clears the run flag when the run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ActiveSchedule {
    fn new(schedule: Schedule, source: String) -> Self {
        Self {
            schedule,
            source,
            running: AtomicBool::new(false),
            stats: Mutex::new(RunStats::default()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.schedule.name()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    fn record_skip(&self) {
        self.stats.lock().skipped += 1;
    }

    fn record_success(&self) {
        let mut stats = self.stats.lock();
        stats.last_run = Some(Utc::now());
        stats.last_error = None;
        stats.consecutive_errors = 0;
        stats.total_runs += 1;
    }

    fn record_failure(&self, message: String) -> u32 {
        let mut stats = self.stats.lock();
        stats.last_error = Some(message);
        stats.consecutive_errors = stats.consecutive_errors.saturating_add(1);
        stats.total_runs += 1;
        stats.total_failures += 1;
        stats.consecutive_errors
    }

    pub(crate) fn status(&self) -> ScheduleStatus {
        let stats = self.stats.lock();
        ScheduleStatus {
            name: self.schedule.name().to_string(),
            source: self.source.clone(),
            interval_secs: self.schedule.period().as_secs(),
            running: self.is_running(),
            last_run: stats.last_run,
            last_error: stats.last_error.clone(),
            consecutive_errors: stats.consecutive_errors,
            total_runs: stats.total_runs,
            total_failures: stats.total_failures,
            skipped: stats.skipped,
        }
    }
}

/// Result of stopping the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was running.
    NotRunning,
    /// Every in-flight run finished before the deadline.
    Drained,
    /// The deadline passed with these schedules still running.
    TimedOut { still_running: Vec<String> },
}

struct RunningState {
    cancel: CancellationToken,
    schedules: BTreeMap<String, Arc<ActiveSchedule>>,
    timers: Vec<JoinHandle<()>>,
}

/// Owns the active schedules while the engine is running.
pub(crate) struct Scheduler {
    drain_timeout: Duration,
    drain_poll_interval: Duration,
    state: Mutex<Option<RunningState>>,
}

impl Scheduler {
    pub(crate) fn new(drain_timeout: Duration, drain_poll_interval: Duration) -> Self {
        Self {
            drain_timeout,
            drain_poll_interval,
            state: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Start a timer for every enabled schedule of `sources`.
    ///
    /// Returns the number of active schedules. Calling this while already
    /// running leaves the existing timers untouched.
    pub(crate) fn start(&self, sources: Vec<(String, Arc<dyn Source>)>, sinks: SharedSinks) -> usize {
        let mut state = self.state.lock();
        if let Some(running) = state.as_ref() {
            warn!("Schedulers already started");
            return running.schedules.len();
        }

        let cancel = CancellationToken::new();
        let mut schedules: BTreeMap<String, Arc<ActiveSchedule>> = BTreeMap::new();
        let mut timers = Vec::new();

        for (source_name, source) in sources {
            for schedule in source.schedules() {
                if !schedule.is_enabled() {
                    debug!(schedule = %schedule.name(), source = %source_name, "Schedule disabled, not starting");
                    continue;
                }
                if schedules.contains_key(schedule.name()) {
                    warn!(
                        schedule = %schedule.name(),
                        source = %source_name,
                        "Duplicate schedule name, keeping the first"
                    );
                    continue;
                }
                if schedule.interval_secs() < MIN_INTERVAL_SECS {
                    warn!(
                        schedule = %schedule.name(),
                        interval_secs = schedule.interval_secs(),
                        "Interval below minimum, clamping to {}s",
                        MIN_INTERVAL_SECS
                    );
                }

                let name = schedule.name().to_string();
                let active = Arc::new(ActiveSchedule::new(schedule, source_name.clone()));
                timers.push(spawn_timer(
                    Arc::clone(&active),
                    Arc::clone(&sinks),
                    cancel.clone(),
                ));
                info!(
                    schedule = %name,
                    source = %source_name,
                    interval_secs = active.schedule.period().as_secs(),
                    "Schedule started"
                );
                schedules.insert(name, active);
            }
        }

        let count = schedules.len();
        *state = Some(RunningState {
            cancel,
            schedules,
            timers,
        });
        count
    }

    /// Stop every timer and wait for in-flight runs to finish.
    ///
    /// Polls the run flags every `drain_poll_interval` up to `drain_timeout`.
    /// On timeout a warning is logged and shutdown proceeds anyway.
    pub(crate) async fn stop(&self) -> DrainOutcome {
        let taken = self.state.lock().take();
        let Some(running) = taken else {
            debug!("Schedulers not running");
            return DrainOutcome::NotRunning;
        };

        running.cancel.cancel();
        for timer in running.timers {
            timer.abort();
            let _ = timer.await;
        }

        let deadline = Instant::now() + self.drain_timeout;
        loop {
            let still_running: Vec<String> = running
                .schedules
                .values()
                .filter(|s| s.is_running())
                .map(|s| s.name().to_string())
                .collect();

            if still_running.is_empty() {
                info!(schedules = running.schedules.len(), "Schedulers stopped");
                return DrainOutcome::Drained;
            }
            if Instant::now() >= deadline {
                warn!(
                    still_running = ?still_running,
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Timed out waiting for in-flight collections, proceeding with shutdown"
                );
                return DrainOutcome::TimedOut { still_running };
            }
            debug!(in_flight = still_running.len(), "Waiting for in-flight collections");
            tokio::time::sleep(self.drain_poll_interval).await;
        }
    }

    pub(crate) fn statuses(&self) -> Vec<ScheduleStatus> {
        self.state
            .lock()
            .as_ref()
            .map(|running| running.schedules.values().map(|s| s.status()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map(|running| running.schedules.len())
            .unwrap_or(0)
    }
}

fn spawn_timer(
    active: Arc<ActiveSchedule>,
    sinks: SharedSinks,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick completes immediately, so the schedule runs once at start.
        let mut ticker = tokio::time::interval(active.schedule.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::spawn(fire(Arc::clone(&active), Arc::clone(&sinks), cancel.clone()));
                }
            }
        }
        debug!(schedule = %active.name(), "Timer stopped");
    })
}

/// One tick of a schedule.
async fn fire(active: Arc<ActiveSchedule>, sinks: SharedSinks, cancel: CancellationToken) {
    let Some(_guard) = active.try_acquire() else {
        active.record_skip();
        debug!(schedule = %active.name(), "Previous run still in flight, skipping tick");
        return;
    };
    // Checked after acquiring so a drain that already saw the flag clear
    // cannot miss a run starting behind it.
    if cancel.is_cancelled() {
        return;
    }

    let run = AssertUnwindSafe(async { active.schedule.collect().await }).catch_unwind();
    match run.await {
        Ok(Ok(points)) => {
            if points.is_empty() {
                debug!(schedule = %active.name(), "Collection returned no points");
            } else {
                let summary = fanout::write_all(&sinks, &points).await;
                debug!(
                    schedule = %active.name(),
                    points = points.len(),
                    sinks_ok = summary.succeeded,
                    sinks_failed = summary.failed.len(),
                    "Collection delivered"
                );
            }
            active.record_success();
        }
        Ok(Err(e)) => {
            let consecutive = active.record_failure(e.to_string());
            warn!(
                schedule = %active.name(),
                consecutive_errors = consecutive,
                error = %e,
                "Collection failed"
            );
        }
        Err(_) => {
            let consecutive = active.record_failure("collector panicked".to_string());
            warn!(
                schedule = %active.name(),
                consecutive_errors = consecutive,
                "Collector panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_run_flag_is_exclusive() {
        let active = ActiveSchedule::new(
            Schedule::new("s", 10, || async { Ok(Vec::new()) }),
            "test:0".to_string(),
        );

        let guard = active.try_acquire();
        assert!(guard.is_some());
        assert!(active.is_running());
        assert!(active.try_acquire().is_none());

        drop(guard);
        assert!(!active.is_running());
        assert!(active.try_acquire().is_some());
    }

    #[test]
    fn test_stats_bookkeeping() {
        let active = ActiveSchedule::new(
            Schedule::new("s", 10, || async { Ok(Vec::new()) }),
            "test:0".to_string(),
        );

        assert_eq!(active.record_failure("a".into()), 1);
        assert_eq!(active.record_failure("b".into()), 2);
        active.record_skip();

        let status = active.status();
        assert_eq!(status.consecutive_errors, 2);
        assert_eq!(status.last_error.as_deref(), Some("b"));
        assert_eq!(status.total_failures, 2);
        assert_eq!(status.skipped, 1);
        assert!(status.last_run.is_none());

        active.record_success();
        let status = active.status();
        assert_eq!(status.consecutive_errors, 0);
        assert!(status.last_error.is_none());
        assert!(status.last_run.is_some());
        assert_eq!(status.total_runs, 3);
    }

    #[tokio::test]
    async fn test_fire_records_collector_error() {
        let active = Arc::new(ActiveSchedule::new(
            Schedule::new("s", 10, || async { Err(Error::plugin("test", "boom")) }),
            "test:0".to_string(),
        ));
        let sinks: SharedSinks = Default::default();

        fire(Arc::clone(&active), sinks, CancellationToken::new()).await;

        let status = active.status();
        assert_eq!(status.consecutive_errors, 1);
        assert!(status.last_error.unwrap().contains("boom"));
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_fire_after_cancel_does_nothing() {
        let active = Arc::new(ActiveSchedule::new(
            Schedule::new("s", 10, || async { Err(Error::plugin("test", "boom")) }),
            "test:0".to_string(),
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        fire(Arc::clone(&active), Default::default(), cancel).await;

        assert_eq!(active.status().total_runs, 0);
        assert!(!active.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let scheduler = Scheduler::new(Duration::from_secs(1), Duration::from_millis(10));
        assert_eq!(scheduler.stop().await, DrainOutcome::NotRunning);
    }
}
