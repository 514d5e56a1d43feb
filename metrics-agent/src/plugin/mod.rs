//! Plugin capability contracts.
//!
//! Sources produce data points on their own schedules, sinks persist them.
//! The engine only ever talks to plugins through the traits defined here.

mod schedule;
mod settings;
mod traits;

pub use schedule::{CollectFuture, CollectorFn, MIN_INTERVAL_SECS, Schedule};
pub use settings::{ScheduleSettings, instance_id};
pub use traits::{Sink, SinkFactory, Source, SourceFactory};
