//! Built-in sources and sinks.

pub mod http_json;
pub mod stdout;
pub mod webhook;

pub use http_json::{HttpJsonConfig, HttpJsonSource};
pub use stdout::StdoutSink;
pub use webhook::{WebhookAuth, WebhookConfig, WebhookSink};

use crate::Result;
use crate::engine::Engine;

/// Register every built-in plugin type with `engine`.
pub fn register_builtin(engine: &Engine) -> Result<()> {
    engine.register_sink(stdout::SINK_TYPE, || Box::new(StdoutSink::default()))?;
    engine.register_sink(webhook::SINK_TYPE, || Box::new(WebhookSink::default()))?;
    engine.register_source(http_json::SOURCE_TYPE, || {
        Box::new(HttpJsonSource::default())
    })?;
    Ok(())
}

/// Deserialize a plugin's configuration entry.
pub(crate) fn parse_config<T>(plugin: &str, config: &serde_json::Value) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(config.clone())
        .map_err(|e| crate::Error::plugin(plugin, format!("invalid configuration: {}", e)))
}
