//! Messaging decorator configuration.

use super::error::{MessagingError, MessagingResult};
use serde::{Deserialize, Serialize};

/// Decorator configuration, read once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// When false, `decorate_producer`/`decorate_consumer` return the
    /// wrapped value untouched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Name of the broker side, tagged as `service` on every span.
    #[serde(default = "default_remote_service_name")]
    pub remote_service_name: String,
}

fn default_enabled() -> bool {
    true
}

fn default_remote_service_name() -> String {
    "broker".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            remote_service_name: default_remote_service_name(),
        }
    }
}

impl MessagingConfig {
    /// Config with the given remote service name.
    pub fn new(remote_service_name: impl Into<String>) -> Self {
        Self {
            remote_service_name: remote_service_name.into(),
            ..Default::default()
        }
    }

    /// Config that turns decoration off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> MessagingResult<()> {
        if self.remote_service_name.trim().is_empty() {
            return Err(MessagingError::Config(
                "remote_service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
