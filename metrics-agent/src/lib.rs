//! metrics-agent library crate.
//!
//! Plugin-based metrics collection: sources produce data points on
//! schedules, the engine fans every batch out to all sinks, and a small HTTP
//! API reports health.

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod plugins;

pub use error::{Error, Result};
