//! Helpers for reading per-instance source configuration.

use serde::{Deserialize, Serialize};

/// Enable/interval toggle for one schedule kind of a source instance.
///
/// Read from `config.schedules.<kind>`, e.g.
/// `{"id": 1, "schedules": {"poll": {"enabled": true, "interval": 30}}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Whether the schedule should run.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interval in seconds.
    pub interval: u64,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleSettings {
    /// Settings for `kind`, falling back to an enabled schedule at `default_interval`.
    ///
    /// A top-level `interval` on the instance is honoured when the schedule
    /// block omits one.
    pub fn from_config(config: &serde_json::Value, kind: &str, default_interval: u64) -> Self {
        let instance_interval = config
            .get("interval")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(default_interval);

        let Some(block) = config.get("schedules").and_then(|s| s.get(kind)) else {
            return Self {
                enabled: true,
                interval: instance_interval,
            };
        };

        Self {
            enabled: block
                .get("enabled")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true),
            interval: block
                .get("interval")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(instance_interval),
        }
    }
}

/// Numeric instance id of a source entry, or `fallback` when absent.
pub fn instance_id(config: &serde_json::Value, fallback: u64) -> u64 {
    config
        .get("id")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(fallback)
}
