//! Preset scenarios for the images API

use crate::config::{HarnessConfig, Thresholds};
use crate::endpoint::{self, SEARCH_TERMS};
use crate::profile::LoadProfile;

/// One actor touching every public endpoint for 15s
pub fn smoke() -> HarnessConfig {
    let mut config = HarnessConfig::new(
        "smoke",
        LoadProfile::Constant {
            actors: 1,
            duration_secs: 15,
        },
        vec![
            endpoint::home(),
            endpoint::categories(),
            endpoint::themes(),
            endpoint::images(),
            endpoint::search(&["test"]),
            endpoint::health(),
        ],
    );
    config.pause_ms = 500;
    config
}

/// Ramp to 50 actors over the circuit-breaker protected endpoints
pub fn circuit_breaker() -> HarnessConfig {
    let mut config = HarnessConfig::new(
        "circuit-breaker",
        LoadProfile::ramp(&[(10, 10), (20, 30), (20, 50), (10, 0)]),
        vec![
            endpoint::home(),
            endpoint::categories(),
            endpoint::themes(),
            endpoint::images(),
            endpoint::search(&SEARCH_TERMS),
        ],
    );
    config.pause_ms = 300;
    config.thresholds = Thresholds {
        p95_latency_ms: Some(3000.0),
        max_failure_rate: Some(0.1),
    };
    config
}

/// Login at 25 requests/s, well above the target's limit of 10/s
pub fn rate_limiter() -> HarnessConfig {
    let mut config = HarnessConfig::new(
        "rate-limiter",
        LoadProfile::ArrivalRate {
            rate_per_sec: 25.0,
            duration_secs: 15,
            max_actors: 50,
        },
        vec![endpoint::login()],
    );
    config.pause_ms = 0;
    config
}

/// Rate limiter and circuit breakers together, up to 100 actors
pub fn combined() -> HarnessConfig {
    let mut config = HarnessConfig::new(
        "combined",
        LoadProfile::ramp(&[(15, 20), (30, 50), (30, 100), (15, 0)]),
        vec![
            endpoint::login(),
            endpoint::home(),
            endpoint::categories(),
            endpoint::themes(),
            endpoint::images(),
            endpoint::search(&SEARCH_TERMS),
        ],
    );
    config.pause_ms = 200;
    config.thresholds = Thresholds {
        p95_latency_ms: Some(3000.0),
        max_failure_rate: Some(0.3),
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_presets_validate() {
        for config in [smoke(), circuit_breaker(), rate_limiter(), combined()] {
            assert!(config.validate().is_ok(), "{} invalid", config.name);
        }
    }

    #[test]
    fn test_preset_durations() {
        assert_eq!(smoke().profile.total_duration(), Duration::from_secs(15));
        assert_eq!(circuit_breaker().profile.total_duration(), Duration::from_secs(60));
        assert_eq!(rate_limiter().profile.total_duration(), Duration::from_secs(15));
        assert_eq!(combined().profile.total_duration(), Duration::from_secs(90));
        assert_eq!(combined().profile.peak_actors(), 100);
    }

    #[test]
    fn test_combined_starts_with_login() {
        let config = combined();
        assert_eq!(config.endpoints[0].name, "login");
        assert_eq!(config.endpoints.len(), 6);
    }
}
