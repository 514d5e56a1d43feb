//! Domain layer for metrics-agent.
//!
//! Holds the uniform time-series record exchanged between sources and sinks.

pub mod point;

pub use point::{DataPoint, DataPointBuilder, FieldValue, TagValue};
