//! Error types for the load test harness

use thiserror::Error;

/// Harness errors
///
/// Per-request problems never show up here: they are classified and counted.
/// Everything in this enum aborts before or instead of a run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

/// Invalid profile or endpoint configuration, detected before any traffic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid target URL '{0}': {1}")]
    InvalidTargetUrl(String, String),

    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("Endpoint '{0}' has no accepted status codes")]
    NoAcceptedStatuses(String),

    #[error("Endpoint '{endpoint}' accepts invalid status code {status}")]
    InvalidStatus { endpoint: String, status: u16 },

    #[error("Endpoint '{endpoint}' path must start with '/': {path}")]
    InvalidPath { endpoint: String, path: String },

    #[error("Endpoint '{0}' declares a query rotation without values")]
    EmptyQueryValues(String),

    #[error("Duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid request timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
