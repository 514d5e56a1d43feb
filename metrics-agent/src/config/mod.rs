//! Agent configuration.
//!
//! Configuration is a single JSON document. Plugin sections are passed to
//! the plugins as raw JSON; the remaining sections are typed here. A few
//! deployment knobs can be overridden from the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::health::DEFAULT_SCHEDULE_ERROR_THRESHOLD;
use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "METRICS_AGENT_CONFIG";

/// Configuration file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(flatten)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Plugin sections.
///
/// `sinks` maps a sink type to its configuration; `sources` maps a source
/// type to a list of instance configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default, alias = "outputs")]
    pub sinks: BTreeMap<String, serde_json::Value>,
    #[serde(default, alias = "inputs")]
    pub sources: BTreeMap<String, Vec<serde_json::Value>>,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on waiting for in-flight runs when stopping.
    pub drain_timeout_secs: u64,
    /// How often the drain re-checks the run flags.
    pub drain_poll_interval_ms: u64,
    /// Consecutive failures at which a schedule counts as unhealthy.
    pub schedule_error_threshold: u32,
    /// Upper bound on a single plugin health check.
    pub health_check_timeout_secs: u64,
    /// Upper bound on each plugin's shutdown call.
    pub shutdown_timeout_secs: u64,
    /// Period of the background health watcher. Zero disables it.
    pub health_watch_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
            drain_poll_interval_ms: 100,
            schedule_error_threshold: DEFAULT_SCHEDULE_ERROR_THRESHOLD,
            health_check_timeout_secs: 5,
            shutdown_timeout_secs: 30,
            health_watch_interval_secs: 60,
        }
    }
}

impl EngineSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms.max(1))
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn health_watch_interval(&self) -> Option<Duration> {
        (self.health_watch_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_watch_interval_secs))
    }
}

/// Status reporter HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 9273,
            enable_cors: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `metrics_agent=debug`. `RUST_LOG` wins when set.
    pub filter: Option<String>,
    /// Directory for daily rotated log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
    /// Days of log files to keep.
    pub retention_days: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: None,
            log_dir: None,
            retention_days: 7,
        }
    }
}

impl AgentConfig {
    /// Parse a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content)?;
        config.validate()?;
        debug!(
            path = %path.display(),
            sinks = config.plugins.sinks.len(),
            source_types = config.plugins.sources.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load the file named by [`CONFIG_PATH_ENV`] (or [`DEFAULT_CONFIG_PATH`])
    /// and apply environment overrides.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "127.0.0.1")
    /// - `API_PORT` (e.g. "9273")
    /// - `LOG_DIR` (e.g. "./logs")
    pub fn from_env_or_file() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay environment variables onto the loaded values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            self.api.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            self.api.port = parsed;
        }

        if let Ok(dir) = std::env::var("LOG_DIR")
            && !dir.trim().is_empty()
        {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Reject documents the engine can never start from.
    pub fn validate(&self) -> Result<()> {
        if self.plugins.sinks.is_empty() {
            return Err(Error::NoSinksConfigured);
        }
        if let Some(key) = self
            .plugins
            .sinks
            .keys()
            .chain(self.plugins.sources.keys())
            .find(|k| k.trim().is_empty())
        {
            return Err(Error::validation(format!("empty plugin type '{}'", key)));
        }
        for (source_type, entries) in &self.plugins.sources {
            if let Some(index) = entries.iter().position(|e| !e.is_object()) {
                return Err(Error::validation(format!(
                    "sources.{}[{}] must be an object",
                    source_type, index
                )));
            }
        }

        let engine = &self.engine;
        if engine.schedule_error_threshold == 0 {
            return Err(Error::validation(
                "engine.schedule_error_threshold must be at least 1",
            ));
        }
        for (name, value) in [
            ("drain_timeout_secs", engine.drain_timeout_secs),
            ("drain_poll_interval_ms", engine.drain_poll_interval_ms),
            ("health_check_timeout_secs", engine.health_check_timeout_secs),
            ("shutdown_timeout_secs", engine.shutdown_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::validation(format!("engine.{} must be positive", name)));
            }
        }
        Ok(())
    }
}
