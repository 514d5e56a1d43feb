//! Health verdict derivation.
//!
//! The verdict is recomputed from live plugin and schedule state on every
//! query; nothing here is persisted.

use serde::{Deserialize, Serialize};

/// Consecutive failures at which a schedule stops counting as healthy.
pub const DEFAULT_SCHEDULE_ERROR_THRESHOLD: u32 = 3;

/// Health status of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every sink, source and schedule is healthy.
    Healthy,
    /// Something is failing but data still flows somewhere.
    Degraded,
    /// No write path, or no input path at all.
    Unhealthy,
}

impl HealthStatus {
    /// Whether the agent is useful enough to report ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health information for a single source or sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Instance name (`<type>` for sinks, `<type>:<id>` for sources).
    pub name: String,
    /// Registered plugin type.
    pub plugin_type: String,
    /// Result of the latest health check.
    pub healthy: bool,
    /// Error text, if any.
    pub error: Option<String>,
}

impl ComponentStatus {
    /// Create a healthy component.
    pub fn healthy(name: impl Into<String>, plugin_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_type: plugin_type.into(),
            healthy: true,
            error: None,
        }
    }

    /// Create an unhealthy component.
    pub fn unhealthy(
        name: impl Into<String>,
        plugin_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin_type: plugin_type.into(),
            healthy: false,
            error: Some(error.into()),
        }
    }
}

/// Derive the agent verdict from per-component health flags.
///
/// Rules, in order:
/// 1. no sinks at all is unhealthy;
/// 2. everything healthy is healthy;
/// 3. at least one healthy sink plus at least one healthy source or schedule is degraded;
/// 4. anything else is unhealthy.
///
/// An empty source or schedule set counts as healthy in both "all" and "any".
pub fn evaluate(sinks: &[bool], sources: &[bool], schedules: &[bool]) -> HealthStatus {
    if sinks.is_empty() {
        return HealthStatus::Unhealthy;
    }

    let all_sinks = sinks.iter().all(|h| *h);
    let any_sink = sinks.iter().any(|h| *h);
    let all_sources = sources.iter().all(|h| *h);
    let any_source = sources.is_empty() || sources.iter().any(|h| *h);
    let all_schedules = schedules.iter().all(|h| *h);
    let any_schedule = schedules.is_empty() || schedules.iter().any(|h| *h);

    if all_sinks && all_sources && all_schedules {
        HealthStatus::Healthy
    } else if any_sink && (any_source || any_schedule) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sinks_is_unhealthy() {
        assert_eq!(evaluate(&[], &[true], &[true]), HealthStatus::Unhealthy);
        assert_eq!(evaluate(&[], &[], &[]), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_everything_healthy() {
        assert_eq!(evaluate(&[true], &[true], &[true, true]), HealthStatus::Healthy);
    }

    #[test]
    fn test_empty_sources_and_schedules_are_vacuously_healthy() {
        assert_eq!(evaluate(&[true], &[], &[]), HealthStatus::Healthy);
    }

    #[test]
    fn test_one_of_two_sinks_with_healthy_source_is_degraded() {
        assert_eq!(
            evaluate(&[true, false], &[true], &[true]),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_failing_schedule_degrades() {
        assert_eq!(evaluate(&[true], &[true], &[true, false]), HealthStatus::Degraded);
    }

    #[test]
    fn test_healthy_schedule_keeps_degraded_when_sources_unhealthy() {
        assert_eq!(evaluate(&[true], &[false], &[true]), HealthStatus::Degraded);
    }

    #[test]
    fn test_all_inputs_lost_is_unhealthy() {
        assert_eq!(evaluate(&[true], &[false], &[false]), HealthStatus::Unhealthy);
        assert_eq!(evaluate(&[true], &[false, false], &[false]), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_no_schedules_with_unhealthy_source_is_degraded() {
        assert_eq!(evaluate(&[true], &[false], &[]), HealthStatus::Degraded);
        assert_eq!(evaluate(&[true], &[], &[false]), HealthStatus::Degraded);
    }

    #[test]
    fn test_no_healthy_sink_is_unhealthy_regardless() {
        assert_eq!(
            evaluate(&[false, false], &[true], &[true]),
            HealthStatus::Unhealthy
        );
        assert_eq!(evaluate(&[false], &[], &[]), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_status_readiness_and_display() {
        assert!(HealthStatus::Healthy.is_ready());
        assert!(HealthStatus::Degraded.is_ready());
        assert!(!HealthStatus::Unhealthy.is_ready());
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn test_component_constructors() {
        let ok = ComponentStatus::healthy("stdout", "stdout");
        assert!(ok.healthy);
        assert!(ok.error.is_none());

        let bad = ComponentStatus::unhealthy("webhook", "webhook", "503 Service Unavailable");
        assert!(!bad.healthy);
        assert_eq!(bad.error.as_deref(), Some("503 Service Unavailable"));
    }
}
