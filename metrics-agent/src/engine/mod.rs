//! Plugin orchestration engine.
//!
//! The engine owns the plugin registry, the initialized source and sink
//! instances, and the running schedules. It is shared as `Arc<Engine>`
//! between the binary, the health watcher and the status API.

pub mod fanout;
pub mod health;
pub mod scheduler;
pub mod status;
pub mod watcher;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

pub use fanout::WriteSummary;
pub use health::{ComponentStatus, HealthStatus};
pub use scheduler::DrainOutcome;
pub use status::{EngineCounts, HealthReport, ScheduleStatus, StatusSnapshot};

use crate::config::{EngineSettings, PluginsConfig};
use crate::domain::DataPoint;
use crate::plugin::{Sink, SinkFactory, Source, SourceFactory, instance_id};
use crate::{Error, Result};
use fanout::{SharedSinks, SinkEntry};
use scheduler::Scheduler;

/// An initialized source instance.
struct SourceEntry {
    name: String,
    source_type: String,
    source: Arc<dyn Source>,
}

/// Orchestrates sources, sinks and schedules.
pub struct Engine {
    settings: EngineSettings,
    source_factories: RwLock<BTreeMap<String, SourceFactory>>,
    sink_factories: RwLock<BTreeMap<String, SinkFactory>>,
    sources: RwLock<Vec<SourceEntry>>,
    sinks: SharedSinks,
    scheduler: Scheduler,
    start_time: Instant,
    shut_down: AtomicBool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let scheduler = Scheduler::new(settings.drain_timeout(), settings.drain_poll_interval());
        Self {
            settings,
            source_factories: RwLock::new(BTreeMap::new()),
            sink_factories: RwLock::new(BTreeMap::new()),
            sources: RwLock::new(Vec::new()),
            sinks: Arc::new(RwLock::new(Vec::new())),
            scheduler,
            start_time: Instant::now(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Register a source type. Re-registering a type replaces its factory.
    pub fn register_source<F>(&self, source_type: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        let source_type = non_empty_type(source_type.into())?;
        let replaced = self
            .source_factories
            .write()
            .insert(source_type.clone(), Arc::new(factory))
            .is_some();
        if replaced {
            debug!(source_type = %source_type, "Source factory replaced");
        } else {
            debug!(source_type = %source_type, "Source factory registered");
        }
        Ok(())
    }

    /// Register a sink type. Re-registering a type replaces its factory.
    pub fn register_sink<F>(&self, sink_type: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Sink> + Send + Sync + 'static,
    {
        let sink_type = non_empty_type(sink_type.into())?;
        let replaced = self
            .sink_factories
            .write()
            .insert(sink_type.clone(), Arc::new(factory))
            .is_some();
        if replaced {
            debug!(sink_type = %sink_type, "Sink factory replaced");
        } else {
            debug!(sink_type = %sink_type, "Sink factory registered");
        }
        Ok(())
    }

    fn source_factory(&self, source_type: &str) -> Option<SourceFactory> {
        self.source_factories.read().get(source_type).cloned()
    }

    fn sink_factory(&self, sink_type: &str) -> Option<SinkFactory> {
        self.sink_factories.read().get(sink_type).cloned()
    }

    /// Registered source types, sorted.
    pub fn source_types(&self) -> Vec<String> {
        self.source_factories.read().keys().cloned().collect()
    }

    /// Registered sink types, sorted.
    pub fn sink_types(&self) -> Vec<String> {
        self.sink_factories.read().keys().cloned().collect()
    }

    /// Instantiate and initialize plugins from their configuration sections.
    ///
    /// Sinks are initialized first and any sink failure is fatal. Sources are
    /// initialized afterwards; a failing source instance is logged and
    /// skipped. Unknown plugin types are logged and skipped.
    pub async fn initialize_from_config(&self, config: &PluginsConfig) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::validation("engine has been shut down"));
        }
        if !self.sinks.read().is_empty() || !self.sources.read().is_empty() {
            return Err(Error::validation("engine is already initialized"));
        }
        if config.sinks.is_empty() {
            return Err(Error::NoSinksConfigured);
        }

        let sinks = self.initialize_sinks(&config.sinks).await?;
        if sinks.is_empty() {
            error!("No sinks could be initialized");
            return Err(Error::NoSinksInitialized);
        }
        *self.sinks.write() = sinks;

        let sources = self.initialize_sources(&config.sources).await;
        if sources.is_empty() {
            error!("No sources could be initialized");
            return Err(Error::NoSourcesInitialized);
        }
        let source_count = sources.len();
        *self.sources.write() = sources;

        info!(
            sinks = self.sinks.read().len(),
            sources = source_count,
            "Plugins initialized"
        );
        Ok(())
    }

    async fn initialize_sinks(
        &self,
        configs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<Arc<SinkEntry>>> {
        let mut entries: Vec<Arc<SinkEntry>> = Vec::with_capacity(configs.len());
        for (sink_type, config) in configs {
            let Some(factory) = self.sink_factory(sink_type) else {
                warn!(sink_type = %sink_type, "Unknown sink type, skipping");
                continue;
            };

            let mut sink = factory();
            if let Err(e) = sink.initialize(config).await {
                error!(sink_type = %sink_type, error = %e, "Sink initialization failed");
                // Release what was already opened before bailing out.
                for entry in &entries {
                    if let Err(e) = entry.sink.shutdown().await {
                        warn!(sink = %entry.name, error = %e, "Sink shutdown failed");
                    }
                }
                return Err(Error::sink_init(sink_type.as_str(), e.to_string()));
            }

            info!(sink_type = %sink_type, "Sink initialized");
            entries.push(Arc::new(SinkEntry::new(
                sink_type.as_str(),
                Arc::from(sink),
            )));
        }
        Ok(entries)
    }

    async fn initialize_sources(
        &self,
        configs: &BTreeMap<String, Vec<serde_json::Value>>,
    ) -> Vec<SourceEntry> {
        let mut entries = Vec::new();
        for (source_type, instances) in configs {
            let Some(factory) = self.source_factory(source_type) else {
                warn!(source_type = %source_type, "Unknown source type, skipping");
                continue;
            };

            for (index, config) in instances.iter().enumerate() {
                let id = instance_id(config, index as u64);
                let name = format!("{}:{}", source_type, id);

                let config = with_instance_id(config, id);
                let mut source = factory();
                match source.initialize(&config).await {
                    Ok(()) => {
                        info!(source = %name, "Source initialized");
                        entries.push(SourceEntry {
                            name,
                            source_type: source_type.clone(),
                            source: Arc::from(source),
                        });
                    }
                    Err(e) => {
                        error!(source = %name, error = %e, "Source initialization failed, skipping");
                    }
                }
            }
        }
        entries
    }

    /// Start a timer for every enabled schedule of every initialized source.
    ///
    /// Each schedule runs once immediately and then every interval. Returns
    /// the number of active schedules.
    pub async fn start_schedulers(&self) -> usize {
        if self.shut_down.load(Ordering::SeqCst) {
            warn!("Engine has been shut down, not starting schedulers");
            return 0;
        }
        let sources: Vec<(String, Arc<dyn Source>)> = self
            .sources
            .read()
            .iter()
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.source)))
            .collect();

        let count = self.scheduler.start(sources, Arc::clone(&self.sinks));
        info!(schedules = count, "Schedulers started");
        count
    }

    /// Stop all timers and wait for in-flight runs, bounded by the drain timeout.
    pub async fn stop_schedulers(&self) -> DrainOutcome {
        self.scheduler.stop().await
    }

    /// Write a batch to every sink concurrently.
    pub async fn write_to_outputs(&self, points: &[DataPoint]) -> WriteSummary {
        fanout::write_all(&self.sinks, points).await
    }

    /// Run every health check and derive the verdict.
    pub async fn health(&self) -> HealthReport {
        let sinks = self.sink_statuses().await;
        let sources = self.source_statuses().await;
        let schedules = self.schedule_statuses();

        let sink_flags: Vec<bool> = sinks.iter().map(|s| s.healthy).collect();
        let source_flags: Vec<bool> = sources.iter().map(|s| s.healthy).collect();
        let threshold = self.settings.schedule_error_threshold;
        let schedule_flags: Vec<bool> = schedules.iter().map(|s| s.is_healthy(threshold)).collect();

        let status = health::evaluate(&sink_flags, &source_flags, &schedule_flags);

        HealthReport {
            status,
            sinks,
            sources,
            schedules,
        }
    }

    /// The verdict alone.
    pub async fn health_status(&self) -> HealthStatus {
        self.health().await.status
    }

    /// Health of every sink. A failing sink reports its last write error
    /// when it has one.
    pub async fn sink_statuses(&self) -> Vec<ComponentStatus> {
        let entries: Vec<Arc<SinkEntry>> = self.sinks.read().clone();
        let timeout = self.settings.health_check_timeout();

        join_all(entries.iter().map(|entry| async move {
            match tokio::time::timeout(timeout, entry.sink.health_check()).await {
                Ok(true) => ComponentStatus::healthy(&entry.name, &entry.name),
                Ok(false) => ComponentStatus::unhealthy(
                    &entry.name,
                    &entry.name,
                    entry
                        .last_error()
                        .unwrap_or_else(|| "health check failed".to_string()),
                ),
                Err(_) => ComponentStatus::unhealthy(
                    &entry.name,
                    &entry.name,
                    "health check timed out",
                ),
            }
        }))
        .await
    }

    /// Health of every source instance.
    pub async fn source_statuses(&self) -> Vec<ComponentStatus> {
        let entries: Vec<(String, String, Arc<dyn Source>)> = self
            .sources
            .read()
            .iter()
            .map(|e| (e.name.clone(), e.source_type.clone(), Arc::clone(&e.source)))
            .collect();
        let timeout = self.settings.health_check_timeout();

        join_all(entries.into_iter().map(|(name, source_type, source)| async move {
            match tokio::time::timeout(timeout, source.health_check()).await {
                Ok(true) => ComponentStatus::healthy(name, source_type),
                Ok(false) => ComponentStatus::unhealthy(name, source_type, "health check failed"),
                Err(_) => ComponentStatus::unhealthy(name, source_type, "health check timed out"),
            }
        }))
        .await
    }

    /// Runtime state of every active schedule, ordered by name.
    pub fn schedule_statuses(&self) -> Vec<ScheduleStatus> {
        self.scheduler.statuses()
    }

    pub fn counts(&self) -> EngineCounts {
        let (active_source_types, active_sources) = {
            let sources = self.sources.read();
            let types: BTreeSet<&str> = sources.iter().map(|e| e.source_type.as_str()).collect();
            (types.len(), sources.len())
        };
        EngineCounts {
            registered_source_types: self.source_factories.read().len(),
            registered_sink_types: self.sink_factories.read().len(),
            active_source_types,
            active_sink_types: self.sinks.read().len(),
            active_sources,
            active_schedules: self.scheduler.active_count(),
        }
    }

    /// Time since the engine was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Health report plus counts and uptime.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let report = self.health().await;
        StatusSnapshot {
            status: report.status,
            uptime_secs: self.uptime().as_secs(),
            counts: self.counts(),
            sinks: report.sinks,
            sources: report.sources,
            schedules: report.schedules,
            timestamp: Utc::now(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop schedules, then shut down sources, then sinks.
    ///
    /// Each plugin's shutdown is bounded by the shutdown timeout and errors
    /// are logged, never propagated. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Engine already shut down");
            return;
        }
        info!("Shutting down engine");

        self.stop_schedulers().await;

        let timeout = self.settings.shutdown_timeout();

        let sources: Vec<SourceEntry> = std::mem::take(&mut *self.sources.write());
        join_all(sources.iter().map(|entry| async move {
            match tokio::time::timeout(timeout, entry.source.shutdown()).await {
                Ok(Ok(())) => debug!(source = %entry.name, "Source shut down"),
                Ok(Err(e)) => warn!(source = %entry.name, error = %e, "Source shutdown failed"),
                Err(_) => warn!(source = %entry.name, "Source shutdown timed out"),
            }
        }))
        .await;

        let sinks: Vec<Arc<SinkEntry>> = std::mem::take(&mut *self.sinks.write());
        join_all(sinks.iter().map(|entry| async move {
            match tokio::time::timeout(timeout, entry.sink.shutdown()).await {
                Ok(Ok(())) => debug!(sink = %entry.name, "Sink shut down"),
                Ok(Err(e)) => warn!(sink = %entry.name, error = %e, "Sink shutdown failed"),
                Err(_) => warn!(sink = %entry.name, "Sink shutdown timed out"),
            }
        }))
        .await;

        self.source_factories.write().clear();
        self.sink_factories.write().clear();

        info!(
            sources = sources.len(),
            sinks = sinks.len(),
            "Engine shut down"
        );
    }
}

/// Copy of a source entry whose `id` is the numeric instance id.
///
/// A missing or non-numeric `id` is replaced by `id`, so the source sees the
/// same id the engine names it by.
fn with_instance_id(config: &serde_json::Value, id: u64) -> serde_json::Value {
    let mut config = config.clone();
    if let Some(map) = config.as_object_mut()
        && map.get("id").and_then(serde_json::Value::as_u64).is_none()
    {
        map.insert("id".to_string(), serde_json::Value::from(id));
    }
    config
}

fn non_empty_type(plugin_type: String) -> Result<String> {
    if plugin_type.trim().is_empty() {
        return Err(Error::validation("plugin type must not be empty"));
    }
    Ok(plugin_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullSink;

    #[async_trait]
    impl Sink for NullSink {
        async fn initialize(&mut self, _config: &serde_json::Value) -> Result<()> {
            Ok(())
        }

        async fn write(&self, _points: &[DataPoint]) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_with_instance_id() {
        assert_eq!(with_instance_id(&json!({}), 2), json!({ "id": 2 }));
        assert_eq!(with_instance_id(&json!({ "id": 9 }), 2), json!({ "id": 9 }));
        assert_eq!(
            with_instance_id(&json!({ "id": "seven", "url": "x" }), 2),
            json!({ "id": 2, "url": "x" })
        );
        assert_eq!(with_instance_id(&json!({ "id": -1 }), 0), json!({ "id": 0 }));
    }

    #[test]
    fn test_register_rejects_empty_type() {
        let engine = Engine::default();
        let err = engine.register_sink("  ", || Box::new(NullSink)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_register_last_wins() {
        let engine = Engine::default();
        engine.register_sink("null", || Box::new(NullSink)).unwrap();
        engine.register_sink("null", || Box::new(NullSink)).unwrap();
        assert_eq!(engine.sink_types(), vec!["null".to_string()]);
        assert_eq!(engine.counts().registered_sink_types, 1);
    }

    #[tokio::test]
    async fn test_empty_sinks_section_is_fatal() {
        let engine = Engine::default();
        let config = PluginsConfig::default();
        let err = engine.initialize_from_config(&config).await.unwrap_err();
        assert!(matches!(err, Error::NoSinksConfigured));
    }

    #[tokio::test]
    async fn test_unknown_sink_types_only_is_fatal() {
        let engine = Engine::default();
        let mut config = PluginsConfig::default();
        config.sinks.insert("nope".to_string(), json!({}));
        let err = engine.initialize_from_config(&config).await.unwrap_err();
        assert!(matches!(err, Error::NoSinksInitialized));
    }

    #[tokio::test]
    async fn test_health_without_sinks_is_unhealthy() {
        let engine = Engine::default();
        assert_eq!(engine.health_status().await, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_noop() {
        let engine = Engine::default();
        engine.register_sink("null", || Box::new(NullSink)).unwrap();
        engine.shutdown().await;
        assert!(engine.is_shut_down());
        engine.shutdown().await;
        assert_eq!(engine.counts(), EngineCounts::default());
    }
}
