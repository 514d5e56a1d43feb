//! Schedule definition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use super::Source;
use crate::Result;
use crate::domain::DataPoint;

/// Smallest interval a schedule can run at.
pub const MIN_INTERVAL_SECS: u64 = 1;

/// Future returned by a collector invocation.
pub type CollectFuture = BoxFuture<'static, Result<Vec<DataPoint>>>;

/// Zero-argument collector bound at schedule construction time.
pub type CollectorFn = Arc<dyn Fn() -> CollectFuture + Send + Sync>;

/// A named, interval-bound unit of recurring collection work.
///
/// The name is the schedule's identity and must be unique across every
/// source. By convention it is `<source type>-<instance id>-<kind>`, see
/// [`Schedule::name_for`].
#[derive(Clone)]
pub struct Schedule {
    name: String,
    interval_secs: u64,
    enabled: bool,
    collector: CollectorFn,
}

impl Schedule {
    /// Create an enabled schedule from any async closure.
    pub fn new<F, Fut>(name: impl Into<String>, interval_secs: u64, collector: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<DataPoint>>> + Send + 'static,
    {
        let collector: CollectorFn = Arc::new(move || Box::pin(collector()) as CollectFuture);
        Self {
            name: name.into(),
            interval_secs,
            enabled: true,
            collector,
        }
    }

    /// Create a schedule whose collector calls `source.collect()`.
    pub fn for_source<S>(name: impl Into<String>, interval_secs: u64, source: Arc<S>) -> Self
    where
        S: Source + ?Sized + 'static,
    {
        Self::new(name, interval_secs, move || {
            let source = Arc::clone(&source);
            async move { source.collect().await }
        })
    }

    /// Conventional schedule name.
    pub fn name_for(source_type: &str, instance_id: u64, kind: &str) -> String {
        format!("{}-{}-{}", source_type, instance_id, kind)
    }

    /// Set whether the schedule should be started.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval as configured.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective timer period, never below [`MIN_INTERVAL_SECS`].
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_INTERVAL_SECS))
    }

    /// Invoke the collector once.
    pub fn collect(&self) -> CollectFuture {
        (self.collector)()
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("name", &self.name)
            .field("interval_secs", &self.interval_secs)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_name_for_convention() {
        assert_eq!(Schedule::name_for("http_json", 3, "poll"), "http_json-3-poll");
    }

    #[test]
    fn test_period_is_clamped() {
        let schedule = Schedule::new("s", 0, || async { Ok(Vec::new()) });
        assert_eq!(schedule.interval_secs(), 0);
        assert_eq!(schedule.period(), Duration::from_secs(MIN_INTERVAL_SECS));

        let schedule = Schedule::new("s", 45, || async { Ok(Vec::new()) });
        assert_eq!(schedule.period(), Duration::from_secs(45));
    }

    #[test]
    fn test_enabled_by_default() {
        let schedule = Schedule::new("s", 10, || async { Ok(Vec::new()) });
        assert!(schedule.is_enabled());
        assert!(!schedule.with_enabled(false).is_enabled());
    }

    #[tokio::test]
    async fn test_collector_is_invoked_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let schedule = Schedule::new("s", 10, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![DataPoint::builder("m").field("v", 1i64).build()])
            }
        });

        let points = schedule.collect().await.unwrap();
        assert_eq!(points.len(), 1);
        schedule.collect().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
