//! Response bodies.

use serde::Serialize;

use crate::engine::{ComponentStatus, ScheduleStatus};

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

/// Component health status.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

impl From<&ComponentStatus> for ComponentHealth {
    fn from(component: &ComponentStatus) -> Self {
        Self {
            name: component.name.clone(),
            status: if component.healthy {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            message: component.error.clone(),
        }
    }
}

/// Body of `GET /api/status/plugins`.
#[derive(Debug, Clone, Serialize)]
pub struct PluginsResponse {
    pub sources: Vec<ComponentStatus>,
    pub sinks: Vec<ComponentStatus>,
}

/// Body of `GET /api/status/schedules`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulesResponse {
    pub total: usize,
    pub schedules: Vec<ScheduleStatus>,
}
