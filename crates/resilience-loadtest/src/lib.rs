//! # Resilience Load Testing
//!
//! Drives HTTP traffic against the images API to observe how its resilience
//! layer behaves under load.
//!
//! ## Features
//!
//! - **Scenario Driver**: ramped actor counts or a fixed arrival rate
//! - **Response Classification**: fallback payloads, rate limiting, failures
//! - **Metrics Aggregation**: lock-free counters and HDR latency histograms
//! - **Thresholds**: p95 latency and failure-rate ceilings decide the exit code
//!
//! ## Usage
//!
//! ```bash
//! # Ramp to 50 actors against the circuit-breaker protected endpoints
//! cargo run --package resilience-loadtest -- circuit-breaker --target http://localhost:8080
//!
//! # Hammer the login endpoint at 25 requests/s
//! cargo run --package resilience-loadtest -- rate-limiter
//!
//! # Run a scenario described in TOML
//! cargo run --package resilience-loadtest -- run --config harness.toml
//! ```

pub mod classifier;
pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod issuer;
pub mod metrics;
pub mod profile;
pub mod scenarios;

pub use classifier::{Classification, EmptyResultPolicy, FallbackKind, ResponseClassifier};
pub use config::{HarnessConfig, Thresholds};
pub use driver::ScenarioDriver;
pub use endpoint::{EndpointSpec, FallbackRule, HttpMethod};
pub use error::{ConfigError, HarnessError, Result};
pub use issuer::{HttpIssuer, RawResponse, RequestIssuer};
pub use metrics::{MetricsAggregator, RunReport, ThresholdReport};
pub use profile::{LoadProfile, RampStage};
