//! Read-only snapshots of engine state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::health::{ComponentStatus, HealthStatus};

/// Runtime state of one active schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleStatus {
    pub name: String,
    /// Source instance that owns the schedule.
    pub source: String,
    pub interval_secs: u64,
    /// Whether a run is in flight right now.
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub total_runs: u64,
    pub total_failures: u64,
    /// Ticks dropped because the previous run had not finished.
    pub skipped: u64,
}

impl ScheduleStatus {
    /// Healthy while the consecutive error count is below `threshold`.
    pub fn is_healthy(&self, threshold: u32) -> bool {
        self.consecutive_errors < threshold
    }
}

/// Counts of registered and active plugins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineCounts {
    pub registered_source_types: usize,
    pub registered_sink_types: usize,
    /// Distinct source types with at least one initialized instance.
    pub active_source_types: usize,
    /// Initialized sinks; one per type.
    pub active_sink_types: usize,
    /// Initialized source instances.
    pub active_sources: usize,
    pub active_schedules: usize,
}

/// Result of a health query.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub sinks: Vec<ComponentStatus>,
    pub sources: Vec<ComponentStatus>,
    pub schedules: Vec<ScheduleStatus>,
}

impl HealthReport {
    /// Every source and sink, in that order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.sources.iter().chain(self.sinks.iter())
    }
}

/// Full status view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub counts: EngineCounts,
    pub sinks: Vec<ComponentStatus>,
    pub sources: Vec<ComponentStatus>,
    pub schedules: Vec<ScheduleStatus>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(consecutive_errors: u32) -> ScheduleStatus {
        ScheduleStatus {
            name: "test-1-main".to_string(),
            source: "test:1".to_string(),
            interval_secs: 10,
            running: false,
            last_run: None,
            last_error: None,
            consecutive_errors,
            total_runs: 0,
            total_failures: 0,
            skipped: 0,
        }
    }

    #[test]
    fn test_schedule_threshold_boundary() {
        assert!(schedule(0).is_healthy(3));
        assert!(schedule(2).is_healthy(3));
        assert!(!schedule(3).is_healthy(3));
        assert!(!schedule(1).is_healthy(1));
    }
}
