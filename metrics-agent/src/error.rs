//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No sinks configured: at least one output is required")]
    NoSinksConfigured,

    #[error("No sinks initialized: there is nowhere to send data")]
    NoSinksInitialized,

    #[error("No sources initialized: there is nothing to collect")]
    NoSourcesInitialized,

    #[error("Failed to initialize sink '{sink_type}': {message}")]
    SinkInit { sink_type: String, message: String },

    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn sink_init(sink_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkInit {
            sink_type: sink_type.into(),
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error aborts startup.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::NoSinksConfigured
                | Self::NoSinksInitialized
                | Self::NoSourcesInitialized
                | Self::SinkInit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::plugin("http_json:1", "connection refused");
        assert_eq!(
            error.to_string(),
            "Plugin 'http_json:1' failed: connection refused"
        );

        let error = Error::config("missing url");
        assert_eq!(error.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_fatal_startup_classification() {
        assert!(Error::NoSinksConfigured.is_fatal_startup());
        assert!(Error::NoSinksInitialized.is_fatal_startup());
        assert!(Error::NoSourcesInitialized.is_fatal_startup());
        assert!(Error::sink_init("webhook", "bad url").is_fatal_startup());
        assert!(!Error::plugin("stdout", "broken pipe").is_fatal_startup());
        assert!(!Error::Other("x".into()).is_fatal_startup());
    }
}
