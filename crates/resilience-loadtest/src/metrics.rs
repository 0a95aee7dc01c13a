//! Metrics aggregation and the final report

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::{Classification, EmptyResultPolicy, FallbackKind, STATUS_TOO_MANY_REQUESTS};
use crate::config::Thresholds;
use crate::endpoint::EndpointSpec;
use crate::error::Result;
use crate::issuer::RawResponse;

// ============================================================================
// OUTCOMES
// ============================================================================

/// One classified request, recorded once and then dropped
#[derive(Debug, Clone)]
pub struct RequestOutcome<'a> {
    pub endpoint: &'a str,
    pub status: u16,
    pub latency: Duration,
    pub classification: Classification,
    /// Status was in the endpoint's accepted set, or the request was throttled
    pub check_passed: bool,
    pub error: Option<&'a str>,
}

impl<'a> RequestOutcome<'a> {
    pub fn new(endpoint: &'a EndpointSpec, response: &'a RawResponse, classification: Classification) -> Self {
        Self {
            endpoint: &endpoint.name,
            status: response.status,
            latency: response.latency,
            classification,
            check_passed: endpoint.accepts(response.status)
                || response.status == STATUS_TOO_MANY_REQUESTS,
            error: response.error.as_deref(),
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Default)]
struct EndpointCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    rate_limited: AtomicU64,
}

/// Run-wide counters shared by every actor
#[derive(Debug)]
pub struct MetricsAggregator {
    total_requests: AtomicU64,
    successes: AtomicU64,
    marker_fallbacks: AtomicU64,
    empty_fallbacks: AtomicU64,
    rate_limited: AtomicU64,
    server_errors: AtomicU64,
    client_errors: AtomicU64,
    unreachable: AtomicU64,
    unrecognized: AtomicU64,

    checks_passed: AtomicU64,
    checks_failed: AtomicU64,

    iterations_completed: AtomicU64,
    iterations_dropped: AtomicU64,

    active_actors: AtomicU64,
    peak_actors: AtomicU64,

    /// Per endpoint, in declaration order
    endpoints: Vec<(String, EndpointCounters)>,

    /// Latency histogram (microseconds)
    latency_histogram: RwLock<Histogram<u64>>,

    /// Transport error counts for unreachable requests
    error_counts: RwLock<HashMap<String, u64>>,

    /// Set when the run starts
    start_time: RwLock<Option<(Instant, DateTime<Utc>)>>,
}

impl MetricsAggregator {
    pub fn new(endpoints: &[EndpointSpec]) -> Result<Self> {
        Ok(Self {
            total_requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            marker_fallbacks: AtomicU64::new(0),
            empty_fallbacks: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
            unrecognized: AtomicU64::new(0),
            checks_passed: AtomicU64::new(0),
            checks_failed: AtomicU64::new(0),
            iterations_completed: AtomicU64::new(0),
            iterations_dropped: AtomicU64::new(0),
            active_actors: AtomicU64::new(0),
            peak_actors: AtomicU64::new(0),
            endpoints: endpoints
                .iter()
                .map(|e| (e.name.clone(), EndpointCounters::default()))
                .collect(),
            // 1µs to 60s
            latency_histogram: RwLock::new(Histogram::new_with_bounds(1, 60_000_000, 3)?),
            error_counts: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        })
    }

    pub fn mark_started(&self) {
        *self.start_time.write() = Some((Instant::now(), Utc::now()));
    }

    /// Record a classified request
    pub fn record(&self, outcome: &RequestOutcome<'_>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let bucket = match outcome.classification {
            Classification::Success => &self.successes,
            Classification::Fallback(FallbackKind::Marker) => &self.marker_fallbacks,
            Classification::Fallback(FallbackKind::EmptyResult) => &self.empty_fallbacks,
            Classification::RateLimited => &self.rate_limited,
            Classification::ServerError => &self.server_errors,
            Classification::ClientError => &self.client_errors,
            Classification::Unreachable => &self.unreachable,
            Classification::Unrecognized => &self.unrecognized,
        };
        bucket.fetch_add(1, Ordering::Relaxed);

        if outcome.check_passed {
            self.checks_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.checks_failed.fetch_add(1, Ordering::Relaxed);
        }

        match self.endpoints.iter().find(|(name, _)| name == outcome.endpoint) {
            Some((_, counters)) => {
                counters.requests.fetch_add(1, Ordering::Relaxed);
                if outcome.classification.is_failure() {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                }
                if outcome.classification.is_fallback() {
                    counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                }
                if outcome.classification == Classification::RateLimited {
                    counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => warn!("Outcome for unknown endpoint '{}'", outcome.endpoint),
        }

        if let Some(error) = outcome.error {
            *self.error_counts.write().entry(error.to_string()).or_insert(0) += 1;
        }

        self.latency_histogram
            .write()
            .saturating_record(outcome.latency.as_micros() as u64);
    }

    pub fn record_iteration(&self) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// An arrival-rate iteration that found no free actor slot
    pub fn record_dropped_iteration(&self) {
        self.iterations_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn actor_started(&self) {
        let active = self.active_actors.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_actors.fetch_max(active, Ordering::Relaxed);
    }

    pub fn actor_stopped(&self) {
        self.active_actors.fetch_sub(1, Ordering::Relaxed);
    }

    /// Actors currently running an iteration or pausing
    pub fn active_actors(&self) -> u64 {
        self.active_actors.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn dropped_iterations(&self) -> u64 {
        self.iterations_dropped.load(Ordering::Relaxed)
    }

    /// Freeze the counters into a report
    pub fn finalize(&self, scenario: &str, target_url: &str, policy: EmptyResultPolicy) -> RunReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let hist = self.latency_histogram.read();
        let (duration_secs, started_at) = match *self.start_time.read() {
            Some((started, started_at)) => (started.elapsed().as_secs_f64(), started_at),
            None => (0.0, Utc::now()),
        };

        let total = load(&self.total_requests);
        let server_errors = load(&self.server_errors);
        let client_errors = load(&self.client_errors);
        let unreachable = load(&self.unreachable);
        let failures = server_errors + client_errors + unreachable;
        let marker_fallbacks = load(&self.marker_fallbacks);
        let empty_result_fallbacks = load(&self.empty_fallbacks);
        let fallbacks = marker_fallbacks + empty_result_fallbacks;
        let rate_limited = load(&self.rate_limited);

        let success_rate = if total > 0 {
            ((total - failures) as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let us_to_ms = |us: u64| us as f64 / 1000.0;
        let (latency_avg_ms, latency_p50_ms, latency_p95_ms, latency_p99_ms, latency_max_ms) =
            if hist.len() > 0 {
                (
                    hist.mean() / 1000.0,
                    us_to_ms(hist.value_at_quantile(0.50)),
                    us_to_ms(hist.value_at_quantile(0.95)),
                    us_to_ms(hist.value_at_quantile(0.99)),
                    us_to_ms(hist.max()),
                )
            } else {
                (0.0, 0.0, 0.0, 0.0, 0.0)
            };

        RunReport {
            scenario: scenario.to_string(),
            target_url: target_url.to_string(),
            started_at,
            duration_secs,
            total_requests: total,
            successes: load(&self.successes),
            failures,
            server_errors,
            client_errors,
            unreachable,
            rate_limited,
            fallbacks,
            marker_fallbacks,
            empty_result_fallbacks,
            unrecognized: load(&self.unrecognized),
            checks_passed: load(&self.checks_passed),
            checks_failed: load(&self.checks_failed),
            iterations_completed: load(&self.iterations_completed),
            iterations_dropped: load(&self.iterations_dropped),
            peak_actors: load(&self.peak_actors),
            success_rate,
            latency_avg_ms,
            latency_p50_ms,
            latency_p95_ms,
            latency_p99_ms,
            latency_max_ms,
            endpoints: self
                .endpoints
                .iter()
                .map(|(name, c)| EndpointSummary {
                    name: name.clone(),
                    requests: load(&c.requests),
                    failures: load(&c.failures),
                    fallbacks: load(&c.fallbacks),
                    rate_limited: load(&c.rate_limited),
                })
                .collect(),
            error_counts: self
                .error_counts
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            empty_result_policy: policy,
            degradation: DegradationVerdict::decide(fallbacks, success_rate),
            retry_hint: RetryHint::decide(latency_avg_ms, fallbacks),
            rate_limiter: RateLimiterVerdict::decide(rate_limited),
        }
    }
}

// ============================================================================
// VERDICTS
// ============================================================================

/// Qualitative reading of the fallback and success figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationVerdict {
    Degraded,
    Nominal,
    Indeterminate,
}

impl DegradationVerdict {
    pub fn decide(fallbacks: u64, success_rate: f64) -> Self {
        if fallbacks > 0 {
            DegradationVerdict::Degraded
        } else if success_rate >= 90.0 {
            DegradationVerdict::Nominal
        } else {
            DegradationVerdict::Indeterminate
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DegradationVerdict::Degraded => "degraded-mode detected, system degraded gracefully",
            DegradationVerdict::Nominal => "nominal, no degradation observed",
            DegradationVerdict::Indeterminate => "indeterminate, inspect logs",
        }
    }
}

/// Latency reading of whether the target retried its backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryHint {
    RetriesLikely,
    NoRetries,
}

impl RetryHint {
    pub fn decide(avg_latency_ms: f64, fallbacks: u64) -> Option<Self> {
        if avg_latency_ms > 1000.0 && fallbacks > 0 {
            Some(RetryHint::RetriesLikely)
        } else if avg_latency_ms < 500.0 {
            Some(RetryHint::NoRetries)
        } else {
            None
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RetryHint::RetriesLikely => "high latency, retries likely attempted",
            RetryHint::NoRetries => "normal latency, no retries needed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimiterVerdict {
    Engaged,
    Idle,
}

impl RateLimiterVerdict {
    pub fn decide(rate_limited: u64) -> Self {
        if rate_limited > 0 {
            RateLimiterVerdict::Engaged
        } else {
            RateLimiterVerdict::Idle
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RateLimiterVerdict::Engaged => "rate limiter engaged",
            RateLimiterVerdict::Idle => "no requests throttled, verify limiter configuration",
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub name: String,
    pub requests: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub rate_limited: u64,
}

/// Final figures of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successes: u64,
    /// Server errors + client errors + unreachable
    pub failures: u64,
    pub server_errors: u64,
    pub client_errors: u64,
    pub unreachable: u64,
    pub rate_limited: u64,
    pub fallbacks: u64,
    pub marker_fallbacks: u64,
    pub empty_result_fallbacks: u64,
    pub unrecognized: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub iterations_completed: u64,
    pub iterations_dropped: u64,
    pub peak_actors: u64,
    /// Percentage of requests that were not failures
    pub success_rate: f64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_max_ms: f64,
    pub endpoints: Vec<EndpointSummary>,
    pub error_counts: BTreeMap<String, u64>,
    pub empty_result_policy: EmptyResultPolicy,
    pub degradation: DegradationVerdict,
    pub retry_hint: Option<RetryHint>,
    pub rate_limiter: RateLimiterVerdict,
}

const RULE: &str = "══════════════════════════════════════════════════════════════";

fn row(text: impl AsRef<str>) {
    println!("║ {:<60} ║", text.as_ref());
}

impl RunReport {
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.failures as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    /// One-line reading of the status checks and server errors
    pub fn check_verdict(&self) -> String {
        let checks = if self.total_requests == 0 {
            "no requests sent".to_string()
        } else if self.checks_failed == 0 {
            "all endpoints answered as expected".to_string()
        } else {
            format!("{} unexpected statuses", self.checks_failed)
        };

        if self.server_errors == 0 {
            format!("{}, no 5xx errors", checks)
        } else {
            format!("{}, {} 5xx errors", checks, self.server_errors)
        }
    }

    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n╔{}╗", RULE);
        row(format!("RESILIENCE LOAD TEST - {}", self.scenario.to_uppercase()));
        println!("╠{}╣", RULE);
        row(format!("Target:            {}", self.target_url));
        row(format!("Started:           {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
        row(format!("Duration:          {:>10.2} s", self.duration_secs));
        row(format!("Peak Actors:       {:>10}", self.peak_actors));
        row(format!("Iterations:        {:>10}", self.iterations_completed));
        if self.iterations_dropped > 0 {
            row(format!("Dropped:           {:>10}", self.iterations_dropped));
        }
        println!("╠{}╣", RULE);
        row("REQUESTS PER ENDPOINT");
        for endpoint in &self.endpoints {
            row(format!(
                "  {:<16} {:>8} req {:>6} fail {:>6} fb {:>6} 429",
                endpoint.name,
                endpoint.requests,
                endpoint.failures,
                endpoint.fallbacks,
                endpoint.rate_limited
            ));
        }
        println!("╠{}╣", RULE);
        row(format!("Total Requests:    {:>10}", self.total_requests));
        row(format!("HTTP Failures:     {:>10}", self.failures));
        row(format!("  server (5xx):    {:>10}", self.server_errors));
        row(format!("  client (4xx):    {:>10}", self.client_errors));
        row(format!("  unreachable:     {:>10}", self.unreachable));
        row(format!("Rate Limited:      {:>10}", self.rate_limited));
        row(format!("Fallbacks:         {:>10}", self.fallbacks));
        row(format!("  marked:          {:>10}", self.marker_fallbacks));
        row(format!("  empty result:    {:>10}", self.empty_result_fallbacks));
        row(format!("Unrecognized:      {:>10}", self.unrecognized));
        row(format!("Checks:            {:>10} passed {:>8} failed", self.checks_passed, self.checks_failed));
        row(format!("Success Rate:      {:>10.2}%", self.success_rate));
        println!("╠{}╣", RULE);
        row("LATENCY (milliseconds)");
        row(format!("  avg:             {:>10.2}", self.latency_avg_ms));
        row(format!("  p50:             {:>10.2}", self.latency_p50_ms));
        row(format!("  p95:             {:>10.2}", self.latency_p95_ms));
        row(format!("  p99:             {:>10.2}", self.latency_p99_ms));
        row(format!("  max:             {:>10.2}", self.latency_max_ms));

        if !self.error_counts.is_empty() {
            println!("╠{}╣", RULE);
            row("TRANSPORT ERRORS");
            for (error_type, count) in &self.error_counts {
                row(format!("  {:<16} {:>10}", error_type, count));
            }
        }

        println!("╠{}╣", RULE);
        row("ANALYSIS");
        row(format!("  Circuit breaker: {}", self.degradation.message()));
        if let Some(hint) = self.retry_hint {
            row(format!("  Retry:           {}", hint.message()));
        }
        row(format!("  Rate limiter:    {}", self.rate_limiter.message()));
        row(format!("  Checks:          {}", self.check_verdict()));
        row(format!("  Assumption:      {}", self.empty_result_policy.describe()));
        println!("╚{}╝\n", RULE);
    }

    /// Evaluate the configured ceilings
    pub fn evaluate(&self, thresholds: &Thresholds) -> ThresholdReport {
        let mut result = ThresholdReport {
            passes: true,
            checks: Vec::new(),
        };

        if let Some(ceiling) = thresholds.p95_latency_ms {
            let passed = self.total_requests > 0 && self.latency_p95_ms < ceiling;
            result.push(ThresholdCheck {
                name: format!("Latency p95 < {}ms", ceiling),
                passed,
                actual: format!("{:.2}ms", self.latency_p95_ms),
                expected: format!("<{}ms", ceiling),
            });
        }

        if let Some(ceiling) = thresholds.max_failure_rate {
            let rate = self.failure_rate();
            let passed = self.total_requests > 0 && rate < ceiling;
            result.push(ThresholdCheck {
                name: format!("HTTP failure rate < {:.0}%", ceiling * 100.0),
                passed,
                actual: if self.total_requests > 0 {
                    format!("{:.2}%", rate * 100.0)
                } else {
                    "no requests".to_string()
                },
                expected: format!("<{:.0}%", ceiling * 100.0),
            });
        }

        result
    }
}

/// Outcome of threshold evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub passes: bool,
    pub checks: Vec<ThresholdCheck>,
}

/// Individual threshold check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub passed: bool,
    pub actual: String,
    pub expected: String,
}

impl ThresholdReport {
    fn push(&mut self, check: ThresholdCheck) {
        if !check.passed {
            self.passes = false;
        }
        self.checks.push(check);
    }

    pub fn print_report(&self) {
        println!("═══════════════════════════════════════════════════════════════");
        println!("                      THRESHOLDS");
        println!("═══════════════════════════════════════════════════════════════");

        if self.checks.is_empty() {
            println!("\n  No thresholds configured");
        }

        for check in &self.checks {
            let status = if check.passed { "✅ PASS" } else { "❌ FAIL" };
            println!("\n  {} - {}", check.name, status);
            println!("    Actual:   {}", check.actual);
            println!("    Expected: {}", check.expected);
        }

        println!("\n═══════════════════════════════════════════════════════════════");
        if self.passes {
            println!("  OVERALL: ✅ ALL THRESHOLDS MET");
        } else {
            println!("  OVERALL: ❌ SOME THRESHOLDS FAILED");
        }
        println!("═══════════════════════════════════════════════════════════════\n");
    }
}
