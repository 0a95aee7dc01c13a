//! Scenario driver
//!
//! Runs a [`HarnessConfig`]: keeps the number of looping actors on the
//! profile's target, or starts iterations at the profile's arrival rate, and
//! feeds every classified response into the shared [`MetricsAggregator`].

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::{Classification, ResponseClassifier};
use crate::config::HarnessConfig;
use crate::endpoint::EndpointSpec;
use crate::error::Result;
use crate::issuer::{HttpIssuer, RequestIssuer};
use crate::metrics::{MetricsAggregator, RequestOutcome, RunReport};
use crate::profile::LoadProfile;

/// How often the driver re-samples the profile
const TICK: Duration = Duration::from_millis(20);

/// State shared by every actor of a run
struct ActorContext {
    endpoints: Vec<EndpointSpec>,
    issuer: Arc<dyn RequestIssuer>,
    classifier: ResponseClassifier,
    metrics: Arc<MetricsAggregator>,
    pause: Duration,
    deadline: Instant,
}

impl ActorContext {
    /// Issue, classify and record one request
    async fn step(&self, endpoint: &EndpointSpec) {
        let response = self.issuer.issue(endpoint).await;
        let classification = self
            .classifier
            .classify(endpoint, response.status, response.body.as_deref());

        debug!(
            endpoint = %endpoint.name,
            status = response.status,
            latency_ms = response.latency.as_millis() as u64,
            outcome = classification.label(),
            "request complete"
        );
        if classification == Classification::Unrecognized {
            warn!("{}: body did not match the expected shape", endpoint.name);
        }

        self.metrics
            .record(&RequestOutcome::new(endpoint, &response, classification));
    }

    /// Sleep for the configured pause; false when the deadline cut it short
    async fn pause(&self) -> bool {
        if self.pause.is_zero() {
            return Instant::now() < self.deadline;
        }
        tokio::select! {
            _ = sleep(self.pause) => true,
            _ = sleep_until(self.deadline) => false,
        }
    }

    /// Run the endpoint sequence once
    async fn run_iteration(&self) -> IterationEnd {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if index > 0 && !self.pause().await {
                return IterationEnd::Interrupted;
            }
            if Instant::now() >= self.deadline {
                return IterationEnd::Interrupted;
            }
            self.step(endpoint).await;
        }

        self.metrics.record_iteration();
        if self.pause().await {
            IterationEnd::Continue
        } else {
            IterationEnd::Finished
        }
    }
}

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationEnd {
    /// Completed with time left for another
    Continue,
    /// Completed, deadline reached during the trailing pause
    Finished,
    /// Deadline reached before the sequence completed
    Interrupted,
}

/// Keeps the active-actor gauge right even when a task is aborted
struct ActorGuard(Arc<MetricsAggregator>);

impl ActorGuard {
    fn new(metrics: &Arc<MetricsAggregator>) -> Self {
        metrics.actor_started();
        Self(metrics.clone())
    }
}

impl Drop for ActorGuard {
    fn drop(&mut self) {
        self.0.actor_stopped();
    }
}

/// Looping actor; retires at an iteration boundary once the target drops to
/// its index or below
async fn run_actor(ctx: Arc<ActorContext>, index: u32, target: watch::Receiver<u32>) {
    let _guard = ActorGuard::new(&ctx.metrics);

    loop {
        let current = *target.borrow();
        if index >= current || ctx.run_iteration().await != IterationEnd::Continue {
            break;
        }
    }
}

/// Drives one scenario run
pub struct ScenarioDriver {
    config: HarnessConfig,
    issuer: Arc<dyn RequestIssuer>,
    metrics: Arc<MetricsAggregator>,
}

impl ScenarioDriver {
    /// Validate the configuration and build an HTTP-backed driver
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let issuer = HttpIssuer::new(
            &config.target_url,
            config.request_timeout(),
            config.profile.peak_actors() as usize,
        )?;
        Self::with_issuer(config, Arc::new(issuer))
    }

    /// Driver sending requests through a custom issuer
    pub fn with_issuer(config: HarnessConfig, issuer: Arc<dyn RequestIssuer>) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsAggregator::new(&config.endpoints)?);
        Ok(Self {
            config,
            issuer,
            metrics,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Live metrics, readable while the run is in progress
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        self.metrics.clone()
    }

    /// Run the scenario to completion
    pub async fn run(&self) -> RunReport {
        let config = &self.config;
        let classifier = ResponseClassifier::new(config.empty_result_policy);

        info!(
            "Starting scenario '{}' against {}: {}",
            config.name,
            config.target_url,
            config.profile.describe()
        );
        info!("Assumption: {}", classifier.policy().describe());

        self.metrics.mark_started();
        let start = Instant::now();
        let ctx = Arc::new(ActorContext {
            endpoints: config.endpoints.clone(),
            issuer: self.issuer.clone(),
            classifier,
            metrics: self.metrics.clone(),
            pause: config.pause(),
            deadline: start + config.profile.total_duration(),
        });

        match config.profile {
            LoadProfile::ArrivalRate { max_actors, .. } => {
                self.run_arrivals(ctx, start, max_actors).await
            }
            LoadProfile::Constant { .. } | LoadProfile::Ramp { .. } => {
                self.run_actors(ctx, start).await
            }
        }

        info!(
            "Scenario '{}' complete: {} requests, {} dropped iterations",
            config.name,
            self.metrics.total_requests(),
            self.metrics.dropped_iterations()
        );

        self.metrics
            .finalize(&config.name, &config.target_url, config.empty_result_policy)
    }

    /// Keep the number of looping actors on the profile's target
    async fn run_actors(&self, ctx: Arc<ActorContext>, start: Instant) {
        let profile = &self.config.profile;
        let total = profile.total_duration();
        let (target_tx, target_rx) = watch::channel(0u32);
        let mut slots: Vec<Option<JoinHandle<()>>> = Vec::new();
        let mut last_target = None;

        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let target = profile.target_actors_at(elapsed).unwrap_or(0);
            target_tx.send_replace(target);
            if last_target != Some(target) {
                debug!("Target actors at {:.1}s: {}", elapsed.as_secs_f64(), target);
                last_target = Some(target);
            }

            // A slot whose actor is still retiring is not refilled
            for index in 0..target as usize {
                if slots.len() <= index {
                    slots.push(None);
                }
                let idle = slots[index].as_ref().map_or(true, |h| h.is_finished());
                if idle {
                    slots[index] = Some(tokio::spawn(run_actor(
                        ctx.clone(),
                        index as u32,
                        target_rx.clone(),
                    )));
                }
            }
        }

        target_tx.send_replace(0);
        self.drain(slots.into_iter().flatten().collect()).await;
    }

    /// Start iterations at the profile's rate; drop those with no free slot
    async fn run_arrivals(&self, ctx: Arc<ActorContext>, start: Instant, max_actors: u32) {
        let profile = &self.config.profile;
        let total = profile.total_duration();
        let slots = Arc::new(Semaphore::new(max_actors as usize));
        let mut inflight = FuturesUnordered::new();
        let mut started = 0u64;

        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            let due = profile.iterations_due(elapsed);

            let mut dropped = 0u64;
            while started < due {
                started += 1;
                match slots.clone().try_acquire_owned() {
                    Ok(permit) => {
                        let ctx = ctx.clone();
                        inflight.push(tokio::spawn(async move {
                            let _permit = permit;
                            let _guard = ActorGuard::new(&ctx.metrics);
                            // Released too close to the deadline to complete
                            if ctx.run_iteration().await == IterationEnd::Interrupted {
                                ctx.metrics.record_dropped_iteration();
                            }
                        }));
                    }
                    Err(_) => {
                        ctx.metrics.record_dropped_iteration();
                        dropped += 1;
                    }
                }
            }
            if dropped > 0 {
                warn!(
                    "{} iterations dropped at {:.1}s: all {} actors busy",
                    dropped,
                    elapsed.as_secs_f64(),
                    max_actors
                );
            }

            // Reap finished iterations
            while let Some(Some(_)) = inflight.next().now_or_never() {}

            if elapsed >= total {
                break;
            }
        }

        self.drain(inflight.into_iter().collect()).await;
    }

    /// Wait for in-flight actors, aborting whatever outlives the graceful stop
    async fn drain(&self, handles: Vec<JoinHandle<()>>) {
        let grace = self.config.graceful_stop();
        let mut pending: FuturesUnordered<JoinHandle<()>> = handles.into_iter().collect();
        if pending.is_empty() {
            return;
        }

        debug!("Waiting up to {:?} for {} actors", grace, pending.len());
        let grace_elapsed = sleep(grace);
        tokio::pin!(grace_elapsed);

        loop {
            tokio::select! {
                next = pending.next() => {
                    if next.is_none() {
                        break;
                    }
                }
                _ = &mut grace_elapsed => {
                    warn!("Graceful stop elapsed, aborting {} actors", pending.len());
                    for handle in pending.iter() {
                        handle.abort();
                    }
                    // Aborted tasks resolve immediately
                    while pending.next().await.is_some() {}
                    break;
                }
            }
        }
    }
}
