//! Source that polls a JSON endpoint.
//!
//! Each poll turns the scalar members of one JSON object into the fields of
//! a single data point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse_config;
use crate::domain::{DataPoint, FieldValue};
use crate::plugin::{Schedule, ScheduleSettings, Source};
use crate::{Error, Result};

pub const SOURCE_TYPE: &str = "http_json";

/// Schedule kind of the polling schedule.
pub const POLL_KIND: &str = "poll";

const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Per-instance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJsonConfig {
    /// Instance id. The engine fills in the list position when absent.
    #[serde(default)]
    pub id: Option<u64>,
    /// Endpoint returning a JSON object.
    pub url: String,
    /// Measurement name of the produced points.
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Static tags added to every point.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// JSON pointer (e.g. `/stats/cpu`) to the object holding the fields.
    #[serde(default)]
    pub fields_path: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_measurement() -> String {
    SOURCE_TYPE.to_string()
}

fn default_timeout() -> u64 {
    10
}

#[derive(Default)]
pub struct HttpJsonSource {
    id: u64,
    config: Option<HttpJsonConfig>,
    schedule: Option<ScheduleSettings>,
    client: Option<Client>,
    last_poll_failed: AtomicBool,
}

/// Build a point from a JSON document.
///
/// Only top-level scalars of the selected object become fields; nested
/// objects, arrays and nulls are ignored.
pub(crate) fn point_from_json(
    config: &HttpJsonConfig,
    document: &serde_json::Value,
) -> Result<DataPoint> {
    let target = match config.fields_path.as_deref() {
        Some(path) => document.pointer(path).ok_or_else(|| {
            Error::plugin(SOURCE_TYPE, format!("fields_path '{}' not found", path))
        })?,
        None => document,
    };
    let Some(object) = target.as_object() else {
        return Err(Error::plugin(SOURCE_TYPE, "response is not a JSON object"));
    };

    let mut builder = DataPoint::builder(&config.measurement);
    for (key, value) in &config.tags {
        builder = builder.tag(key, value.as_str());
    }
    for (key, value) in object {
        if let Some(field) = FieldValue::from_json(value) {
            builder = builder.field(key, field);
        }
    }

    if !builder.has_fields() {
        return Err(Error::plugin(SOURCE_TYPE, "response contains no scalar fields"));
    }
    Ok(builder.build())
}

impl HttpJsonSource {
    fn name(&self) -> String {
        format!("{}:{}", SOURCE_TYPE, self.id)
    }

    async fn poll(&self) -> Result<DataPoint> {
        let (Some(config), Some(client)) = (&self.config, &self.client) else {
            return Err(Error::plugin(self.name(), "source is not initialized"));
        };

        let response = client
            .get(&config.url)
            .send()
            .await
            .map_err(|e| Error::plugin(self.name(), format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::plugin(
                self.name(),
                format!("endpoint returned {}", status),
            ));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::plugin(self.name(), format!("invalid JSON response: {}", e)))?;

        point_from_json(config, &document)
    }
}

#[async_trait]
impl Source for HttpJsonSource {
    async fn initialize(&mut self, config: &serde_json::Value) -> Result<()> {
        let parsed: HttpJsonConfig = parse_config(SOURCE_TYPE, config)?;
        reqwest::Url::parse(&parsed.url)
            .map_err(|e| Error::plugin(SOURCE_TYPE, format!("invalid url: {}", e)))?;
        if let Some(path) = &parsed.fields_path
            && !path.is_empty()
            && !path.starts_with('/')
        {
            return Err(Error::plugin(
                SOURCE_TYPE,
                "fields_path must be a JSON pointer starting with '/'",
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(parsed.timeout_secs))
            .build()?;

        self.id = parsed.id.unwrap_or_default();
        self.schedule = Some(ScheduleSettings::from_config(
            config,
            POLL_KIND,
            DEFAULT_INTERVAL_SECS,
        ));
        self.config = Some(parsed);
        self.client = Some(client);
        Ok(())
    }

    async fn collect(&self) -> Result<Vec<DataPoint>> {
        let result = self.poll().await;
        self.last_poll_failed.store(result.is_err(), Ordering::SeqCst);
        let point = result?;
        debug!(source = %self.name(), fields = point.fields().len(), "Polled endpoint");
        Ok(vec![point])
    }

    fn schedules(self: Arc<Self>) -> Vec<Schedule> {
        let Some(settings) = self.schedule else {
            return Vec::new();
        };
        let name = Schedule::name_for(SOURCE_TYPE, self.id, POLL_KIND);
        vec![Schedule::for_source(name, settings.interval, self).with_enabled(settings.enabled)]
    }

    async fn health_check(&self) -> bool {
        self.client.is_some() && !self.last_poll_failed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
