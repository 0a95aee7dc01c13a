//! Harness configuration
//!
//! A run is fully described by one [`HarnessConfig`], built from a preset or
//! read from a TOML file. It is validated once before any traffic is sent.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::EmptyResultPolicy;
use crate::endpoint::EndpointSpec;
use crate::error::{ConfigError, Result};
use crate::profile::LoadProfile;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Scenario name shown in the report
    #[serde(default = "default_name")]
    pub name: String,

    /// Target base URL
    #[serde(default = "default_target_url")]
    pub target_url: String,

    pub profile: LoadProfile,

    /// Pause after each request within an iteration, in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight actors once the run duration is over
    #[serde(default = "default_graceful_stop_secs")]
    pub graceful_stop_secs: u64,

    #[serde(default)]
    pub empty_result_policy: EmptyResultPolicy,

    #[serde(default)]
    pub thresholds: Thresholds,

    /// Requests of one iteration, in order
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

fn default_name() -> String {
    "custom".to_string()
}

pub fn default_target_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_pause_ms() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_graceful_stop_secs() -> u64 {
    30
}

/// Pass/fail ceilings evaluated against the final report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// 95th percentile latency ceiling in milliseconds
    #[serde(default)]
    pub p95_latency_ms: Option<f64>,

    /// Ceiling on failed requests / total requests, in `[0, 1]`
    #[serde(default)]
    pub max_failure_rate: Option<f64>,
}

impl Thresholds {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(p95) = self.p95_latency_ms {
            if !p95.is_finite() || p95 <= 0.0 {
                return Err(ConfigError::InvalidThreshold(format!(
                    "p95_latency_ms must be positive, got {}",
                    p95
                )));
            }
        }
        if let Some(rate) = self.max_failure_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidThreshold(format!(
                    "max_failure_rate must be within [0, 1], got {}",
                    rate
                )));
            }
        }
        Ok(())
    }
}

impl HarnessConfig {
    pub fn new(name: &str, profile: LoadProfile, endpoints: Vec<EndpointSpec>) -> Self {
        Self {
            name: name.to_string(),
            target_url: default_target_url(),
            profile,
            pause_ms: default_pause_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            graceful_stop_secs: default_graceful_stop_secs(),
            empty_result_policy: EmptyResultPolicy::default(),
            thresholds: Thresholds::default(),
            endpoints,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_target(mut self, target_url: &str) -> Self {
        self.target_url = target_url.to_string();
        self
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    /// Reject anything that would make the run meaningless
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.target_url)
            .map_err(|e| ConfigError::InvalidTargetUrl(self.target_url.clone(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTargetUrl(
                self.target_url.clone(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if !names.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.name.clone()));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("request timeout must be non-zero".into()));
        }

        self.profile.validate()?;
        self.thresholds.validate()
    }
}
