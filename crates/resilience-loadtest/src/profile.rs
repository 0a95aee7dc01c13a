//! Concurrency profiles as functions of elapsed time
//!
//! Nothing here sleeps or spawns. The driver samples these functions on every
//! tick, which keeps the schedule testable without a live server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Linear ramp from the previous stage's target to `target` over `duration_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampStage {
    pub duration_secs: u64,
    pub target: u32,
}

impl RampStage {
    pub fn new(duration_secs: u64, target: u32) -> Self {
        Self {
            duration_secs,
            target,
        }
    }
}

/// How many actors run, or how fast iterations start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoadProfile {
    /// Fixed number of looping actors
    Constant { actors: u32, duration_secs: u64 },

    /// Looping actors whose count follows the stages, starting from zero
    Ramp { stages: Vec<RampStage> },

    /// Iterations started at a fixed rate, at most `max_actors` in flight
    ArrivalRate {
        rate_per_sec: f64,
        duration_secs: u64,
        max_actors: u32,
    },
}

impl LoadProfile {
    pub fn ramp(stages: &[(u64, u32)]) -> Self {
        LoadProfile::Ramp {
            stages: stages
                .iter()
                .map(|&(duration_secs, target)| RampStage::new(duration_secs, target))
                .collect(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            LoadProfile::Constant { duration_secs, .. } => Duration::from_secs(*duration_secs),
            LoadProfile::Ramp { stages } => {
                Duration::from_secs(stages.iter().map(|s| s.duration_secs).sum())
            }
            LoadProfile::ArrivalRate { duration_secs, .. } => Duration::from_secs(*duration_secs),
        }
    }

    /// Target looping actors at `elapsed`; `None` for arrival-rate profiles
    pub fn target_actors_at(&self, elapsed: Duration) -> Option<u32> {
        match self {
            LoadProfile::Constant { actors, .. } => {
                Some(if elapsed < self.total_duration() { *actors } else { 0 })
            }
            LoadProfile::Ramp { stages } => Some(ramp_target_at(stages, elapsed)),
            LoadProfile::ArrivalRate { .. } => None,
        }
    }

    /// Iterations that should have started by `elapsed`; 0 for actor profiles
    pub fn iterations_due(&self, elapsed: Duration) -> u64 {
        let LoadProfile::ArrivalRate {
            rate_per_sec,
            duration_secs,
            ..
        } = self
        else {
            return 0;
        };

        let total = (rate_per_sec * *duration_secs as f64).floor() as u64;
        if elapsed.as_secs_f64() >= *duration_secs as f64 {
            return total;
        }
        // First iteration starts at t=0
        ((rate_per_sec * elapsed.as_secs_f64()).floor() as u64 + 1).min(total)
    }

    /// Upper bound on simultaneous actors over the whole run
    pub fn peak_actors(&self) -> u32 {
        match self {
            LoadProfile::Constant { actors, .. } => *actors,
            LoadProfile::Ramp { stages } => stages.iter().map(|s| s.target).max().unwrap_or(0),
            LoadProfile::ArrivalRate { max_actors, .. } => *max_actors,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            LoadProfile::Constant {
                actors,
                duration_secs,
            } => {
                if *actors == 0 {
                    return Err(ConfigError::InvalidProfile("constant profile needs at least one actor".into()));
                }
                if *duration_secs == 0 {
                    return Err(ConfigError::InvalidProfile("constant profile has zero duration".into()));
                }
            }
            LoadProfile::Ramp { stages } => {
                if stages.is_empty() {
                    return Err(ConfigError::InvalidProfile("ramp profile has no stages".into()));
                }
                if self.total_duration().is_zero() {
                    return Err(ConfigError::InvalidProfile("ramp profile has zero total duration".into()));
                }
                if self.peak_actors() == 0 {
                    return Err(ConfigError::InvalidProfile("ramp profile never starts an actor".into()));
                }
            }
            LoadProfile::ArrivalRate {
                rate_per_sec,
                duration_secs,
                max_actors,
            } => {
                if !rate_per_sec.is_finite() || *rate_per_sec <= 0.0 {
                    return Err(ConfigError::InvalidProfile(format!(
                        "arrival rate must be positive, got {}",
                        rate_per_sec
                    )));
                }
                if *duration_secs == 0 {
                    return Err(ConfigError::InvalidProfile("arrival-rate profile has zero duration".into()));
                }
                if *max_actors == 0 {
                    return Err(ConfigError::InvalidProfile("arrival-rate profile needs max_actors > 0".into()));
                }
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        match self {
            LoadProfile::Constant {
                actors,
                duration_secs,
            } => format!("{} actors for {}s", actors, duration_secs),
            LoadProfile::Ramp { stages } => {
                let stages: Vec<String> = stages
                    .iter()
                    .map(|s| format!("{}s→{}", s.duration_secs, s.target))
                    .collect();
                format!("ramp [{}]", stages.join(", "))
            }
            LoadProfile::ArrivalRate {
                rate_per_sec,
                duration_secs,
                max_actors,
            } => format!(
                "{} iterations/s for {}s (max {} actors)",
                rate_per_sec, duration_secs, max_actors
            ),
        }
    }
}

fn ramp_target_at(stages: &[RampStage], elapsed: Duration) -> u32 {
    let t = elapsed.as_secs_f64();
    let mut stage_start = 0.0;
    let mut from = 0u32;

    for stage in stages {
        let stage_end = stage_start + stage.duration_secs as f64;
        if t < stage_end {
            let progress = (t - stage_start) / stage.duration_secs as f64;
            let value = from as f64 + (stage.target as f64 - from as f64) * progress;
            return value.round() as u32;
        }
        stage_start = stage_end;
        from = stage.target;
    }

    0
}
