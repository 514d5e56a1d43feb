//! Test plugins with observable behaviour.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

use metrics_agent::config::{EngineSettings, PluginsConfig};
use metrics_agent::domain::DataPoint;
use metrics_agent::engine::Engine;
use metrics_agent::plugin::{Schedule, Sink, Source};
use metrics_agent::{Error, Result};

/// Observations shared by every instance of the test source.
#[derive(Default)]
pub struct SourceStats {
    pub calls: AtomicUsize,
    pub disabled_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub blocking: AtomicBool,
    pub release: Notify,
    pub shutdowns: AtomicUsize,
}

impl SourceStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make collectors wait until [`SourceStats::unblock`].
    pub fn block(&self) {
        self.blocking.store(true, Ordering::SeqCst);
    }

    pub fn unblock(&self) {
        self.blocking.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }
}

/// Source configured from its JSON entry:
/// `{ "interval": 1, "enabled": true, "fail_init": false, "fail_collect": false,
///    "healthy": true, "with_disabled": false, "empty": false }`.
pub struct TestSource {
    stats: Arc<SourceStats>,
    id: u64,
    interval: u64,
    enabled: bool,
    fail_collect: bool,
    healthy: bool,
    with_disabled: bool,
    empty: bool,
}

impl TestSource {
    pub fn new(stats: Arc<SourceStats>) -> Self {
        Self {
            stats,
            id: 0,
            interval: 1,
            enabled: true,
            fail_collect: false,
            healthy: true,
            with_disabled: false,
            empty: false,
        }
    }
}

fn flag(config: &Value, key: &str, default: bool) -> bool {
    config.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[async_trait]
impl Source for TestSource {
    async fn initialize(&mut self, config: &Value) -> Result<()> {
        if flag(config, "fail_init", false) {
            return Err(Error::plugin("test", "refusing to start"));
        }
        self.id = config.get("id").and_then(Value::as_u64).unwrap_or(0);
        self.interval = config.get("interval").and_then(Value::as_u64).unwrap_or(1);
        self.enabled = flag(config, "enabled", true);
        self.fail_collect = flag(config, "fail_collect", false);
        self.healthy = flag(config, "healthy", true);
        self.with_disabled = flag(config, "with_disabled", false);
        self.empty = flag(config, "empty", false);
        Ok(())
    }

    async fn collect(&self) -> Result<Vec<DataPoint>> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.stats.blocking.load(Ordering::SeqCst) {
            self.stats.release.notified().await;
        }
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_collect {
            return Err(Error::plugin("test", "collect failed"));
        }
        if self.empty {
            return Ok(Vec::new());
        }
        Ok(vec![
            DataPoint::builder("test")
                .tag("instance", self.id as i64)
                .field("value", 1i64)
                .build(),
        ])
    }

    fn schedules(self: Arc<Self>) -> Vec<Schedule> {
        let mut schedules = Vec::new();
        if self.with_disabled {
            let stats = Arc::clone(&self.stats);
            schedules.push(
                Schedule::new(
                    Schedule::name_for("test", self.id, "disabled"),
                    self.interval,
                    move || {
                        let stats = Arc::clone(&stats);
                        async move {
                            stats.disabled_calls.fetch_add(1, Ordering::SeqCst);
                            Ok(Vec::new())
                        }
                    },
                )
                .with_enabled(false),
            );
        }
        let name = Schedule::name_for("test", self.id, "main");
        let interval = self.interval;
        let enabled = self.enabled;
        schedules.push(Schedule::for_source(name, interval, self).with_enabled(enabled));
        schedules
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    async fn shutdown(&self) -> Result<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Observations of one sink type.
#[derive(Default)]
pub struct SinkStats {
    pub batches: Mutex<Vec<usize>>,
    pub shutdowns: AtomicUsize,
}

impl SinkStats {
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    pub fn points(&self) -> usize {
        self.batches.lock().iter().sum()
    }
}

/// Sink configured from its JSON entry:
/// `{ "fail_init": false, "fail_writes": false, "healthy": true }`.
pub struct TestSink {
    stats: Arc<SinkStats>,
    fail_writes: bool,
    healthy: bool,
}

impl TestSink {
    pub fn new(stats: Arc<SinkStats>) -> Self {
        Self {
            stats,
            fail_writes: false,
            healthy: true,
        }
    }
}

#[async_trait]
impl Sink for TestSink {
    async fn initialize(&mut self, config: &Value) -> Result<()> {
        if flag(config, "fail_init", false) {
            return Err(Error::plugin("test sink", "cannot connect"));
        }
        self.fail_writes = flag(config, "fail_writes", false);
        self.healthy = flag(config, "healthy", true);
        Ok(())
    }

    async fn write(&self, points: &[DataPoint]) -> Result<()> {
        if self.fail_writes {
            return Err(Error::plugin("test sink", "write rejected"));
        }
        self.stats.batches.lock().push(points.len());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    async fn shutdown(&self) -> Result<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine with a `test` source type and `recording` / `failing` sink types.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub source: Arc<SourceStats>,
    pub recording: Arc<SinkStats>,
    pub failing: Arc<SinkStats>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings {
            drain_timeout_secs: 5,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let engine = Arc::new(Engine::new(settings));
        let source = Arc::new(SourceStats::default());
        let recording = Arc::new(SinkStats::default());
        let failing = Arc::new(SinkStats::default());

        let stats = Arc::clone(&source);
        engine
            .register_source("test", move || Box::new(TestSource::new(Arc::clone(&stats))))
            .unwrap();
        let stats = Arc::clone(&recording);
        engine
            .register_sink("recording", move || Box::new(TestSink::new(Arc::clone(&stats))))
            .unwrap();
        let stats = Arc::clone(&failing);
        engine
            .register_sink("failing", move || Box::new(TestSink::new(Arc::clone(&stats))))
            .unwrap();

        Self {
            engine,
            source,
            recording,
            failing,
        }
    }

    /// Initialize with a single recording sink and the given test source entries.
    pub async fn init_with_sources(&self, sources: Value) -> Result<()> {
        self.engine
            .initialize_from_config(&plugins(json!({ "recording": {} }), sources))
            .await
    }
}

pub fn plugins(sinks: Value, test_sources: Value) -> PluginsConfig {
    serde_json::from_value(json!({
        "sinks": sinks,
        "sources": { "test": test_sources }
    }))
    .unwrap()
}
