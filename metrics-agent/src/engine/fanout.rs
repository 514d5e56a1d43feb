//! Concurrent delivery of a batch to every sink.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::domain::DataPoint;
use crate::plugin::Sink;

/// An initialized sink held by the engine.
pub(crate) struct SinkEntry {
    pub(crate) name: String,
    pub(crate) sink: Arc<dyn Sink>,
    last_error: Mutex<Option<String>>,
}

impl SinkEntry {
    pub(crate) fn new(name: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        Self {
            name: name.into(),
            sink,
            last_error: Mutex::new(None),
        }
    }

    /// Error text of the most recent failed write, cleared by the next success.
    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

/// Sinks shared between the engine and running schedules.
pub(crate) type SharedSinks = Arc<RwLock<Vec<Arc<SinkEntry>>>>;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Number of sinks that accepted the batch.
    pub succeeded: usize,
    /// Names of sinks whose write failed.
    pub failed: Vec<String>,
}

impl WriteSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write `points` to every sink concurrently and wait for all of them.
///
/// Each sink sees the same batch. A failing sink is logged and recorded on
/// its entry; it never affects delivery to the others.
pub(crate) async fn write_all(sinks: &SharedSinks, points: &[DataPoint]) -> WriteSummary {
    // Snapshot so the lock is not held across the writes.
    let targets: Vec<Arc<SinkEntry>> = sinks.read().clone();
    if targets.is_empty() {
        warn!(points = points.len(), "No sinks available, dropping batch");
        return WriteSummary::default();
    }

    let results = join_all(targets.iter().map(|entry| async move {
        let result = entry.sink.write(points).await;
        (entry, result)
    }))
    .await;

    let mut summary = WriteSummary::default();
    for (entry, result) in results {
        match result {
            Ok(()) => {
                *entry.last_error.lock() = None;
                debug!(sink = %entry.name, points = points.len(), "Batch written");
                summary.succeeded += 1;
            }
            Err(e) => {
                error!(sink = %entry.name, points = points.len(), error = %e, "Sink write failed");
                *entry.last_error.lock() = Some(e.to_string());
                summary.failed.push(entry.name.clone());
            }
        }
    }
    summary
}
