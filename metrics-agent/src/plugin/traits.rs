//! Source and sink traits.

use std::sync::Arc;

use async_trait::async_trait;

use super::Schedule;
use crate::Result;
use crate::domain::DataPoint;

/// A pluggable data-collection unit.
///
/// A source is created by its factory, initialized once with its configuration
/// entry, and then wrapped in an `Arc` so its schedules can share it.
#[async_trait]
pub trait Source: Send + Sync {
    /// Apply the configuration entry for this instance.
    async fn initialize(&mut self, config: &serde_json::Value) -> Result<()>;

    /// Produce one batch of data points.
    async fn collect(&self) -> Result<Vec<DataPoint>>;

    /// Enumerate the recurring work this source wants scheduled.
    ///
    /// Disabled schedules may be returned; the engine never starts them.
    fn schedules(self: Arc<Self>) -> Vec<Schedule>;

    /// Whether the source is currently able to produce data.
    async fn health_check(&self) -> bool;

    /// Release resources. Called once during engine shutdown.
    async fn shutdown(&self) -> Result<()>;
}

/// A pluggable data-destination unit.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Apply the configuration entry for this sink.
    async fn initialize(&mut self, config: &serde_json::Value) -> Result<()>;

    /// Durably write a batch of points.
    async fn write(&self, points: &[DataPoint]) -> Result<()>;

    /// Whether the sink is currently able to accept writes.
    async fn health_check(&self) -> bool;

    /// Flush and release resources. Called once during engine shutdown.
    async fn shutdown(&self) -> Result<()>;
}

/// Constructor producing a fresh, uninitialized source.
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn Source> + Send + Sync>;

/// Constructor producing a fresh, uninitialized sink.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn Sink> + Send + Sync>;
