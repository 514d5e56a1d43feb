//! Sink that POSTs batches to an HTTP endpoint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::parse_config;
use crate::domain::DataPoint;
use crate::plugin::Sink;
use crate::{Error, Result};

pub const SINK_TYPE: &str = "webhook";

/// Webhook sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint URL.
    pub url: String,
    /// HTTP method, POST or PUT (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Authentication type.
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: BTreeMap::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Webhook sink. Unconfigured until `initialize`.
#[derive(Default)]
pub struct WebhookSink {
    config: WebhookConfig,
    client: Option<Client>,
    last_write_failed: AtomicBool,
}

impl WebhookSink {
    /// Build the request headers.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            insert_header(&mut headers, name, value)?;
        }

        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => {
                insert_header(&mut headers, "authorization", &format!("Bearer {}", token))?;
            }
            Some(WebhookAuth::Header { name, value }) => {
                insert_header(&mut headers, name, value)?;
            }
            // Basic auth is applied on the request builder.
            Some(WebhookAuth::Basic { .. }) | None => {}
        }

        Ok(headers)
    }

    /// Build the JSON payload.
    fn build_payload(points: &[DataPoint]) -> serde_json::Value {
        json!({ "points": points })
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = name
        .parse::<reqwest::header::HeaderName>()
        .map_err(|e| Error::plugin(SINK_TYPE, format!("invalid header name '{}': {}", name, e)))?;
    let value = value
        .parse::<reqwest::header::HeaderValue>()
        .map_err(|e| Error::plugin(SINK_TYPE, format!("invalid header value: {}", e)))?;
    headers.insert(name, value);
    Ok(())
}

#[async_trait]
impl Sink for WebhookSink {
    async fn initialize(&mut self, config: &serde_json::Value) -> Result<()> {
        let config: WebhookConfig = parse_config(SINK_TYPE, config)?;
        if config.url.trim().is_empty() {
            return Err(Error::plugin(SINK_TYPE, "url is required"));
        }
        reqwest::Url::parse(&config.url)
            .map_err(|e| Error::plugin(SINK_TYPE, format!("invalid url: {}", e)))?;
        if !matches!(config.method.to_uppercase().as_str(), "POST" | "PUT") {
            return Err(Error::plugin(
                SINK_TYPE,
                format!("unsupported method '{}'", config.method),
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        self.config = config;
        // Reject malformed headers at startup.
        self.build_headers()?;
        self.client = Some(client);
        Ok(())
    }

    async fn write(&self, points: &[DataPoint]) -> Result<()> {
        let Some(client) = &self.client else {
            return Err(Error::plugin(SINK_TYPE, "sink is not initialized"));
        };

        let result: Result<()> = async {
            let mut request = match self.config.method.to_uppercase().as_str() {
                "PUT" => client.put(&self.config.url),
                _ => client.post(&self.config.url),
            };
            request = request
                .headers(self.build_headers()?)
                .json(&Self::build_payload(points));

            if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
                request = request.basic_auth(username, Some(password));
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::plugin(SINK_TYPE, format!("request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("Webhook write failed: {} - {}", status, body);
                return Err(Error::plugin(
                    SINK_TYPE,
                    format!("endpoint returned {} - {}", status, body),
                ));
            }
            Ok(())
        }
        .await;

        self.last_write_failed.store(result.is_err(), Ordering::SeqCst);
        if result.is_ok() {
            debug!(points = points.len(), url = %self.config.url, "Webhook batch delivered");
        }
        result
    }

    async fn health_check(&self) -> bool {
        self.client.is_some() && !self.last_write_failed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
