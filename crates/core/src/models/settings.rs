use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

pub const ENV_API_URL: &str = "ADVISOR_API_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "ADVISOR_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_PENDING_SAVES: &str = "ADVISOR_MAX_PENDING_SAVES";

/// Default number of pending saves kept per tab.
pub const DEFAULT_MAX_PENDING_SAVES: usize = 5;

/// Client configuration: where the backend lives and how much work to buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL. Relative values resolve against `http://localhost`.
    pub api_base: String,

    /// Per-request timeout in seconds (ignored on wasm32, where the browser owns timeouts).
    pub request_timeout_secs: u64,

    /// Maximum number of pending portfolio saves retained; oldest are evicted first.
    pub max_pending_saves: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "/api".to_string(),
            request_timeout_secs: 30,
            max_pending_saves: DEFAULT_MAX_PENDING_SAVES,
        }
    }
}

impl ClientConfig {
    /// Build a config from `ADVISOR_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Ok(base) = std::env::var(ENV_API_URL) {
            if !base.trim().is_empty() {
                config.api_base = base.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var(ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| {
                CoreError::InvalidConfig(format!(
                    "{ENV_REQUEST_TIMEOUT_SECS}='{raw}' is not a whole number of seconds"
                ))
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_PENDING_SAVES) {
            config.max_pending_saves = raw.trim().parse().map_err(|_| {
                CoreError::InvalidConfig(format!(
                    "{ENV_MAX_PENDING_SAVES}='{raw}' is not a positive integer"
                ))
            })?;
        }

        config.validate()
    }

    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidConfig(format!("Failed to parse config: {e}")))?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, CoreError> {
        if self.max_pending_saves == 0 {
            return Err(CoreError::InvalidConfig(
                "max_pending_saves must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}
