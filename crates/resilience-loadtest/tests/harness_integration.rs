//! Integration tests for the resilience load harness
//!
//! A wiremock server stands in for the images API so the real HTTP issuer,
//! the classifier and the driver run end to end.

use std::sync::Arc;
use std::time::Duration;

use resilience_loadtest::endpoint;
use resilience_loadtest::{
    Classification, EmptyResultPolicy, FallbackKind, HarnessConfig, HttpIssuer, LoadProfile,
    RequestIssuer, ResponseClassifier, ScenarioDriver,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issuer_for(server: &MockServer) -> HttpIssuer {
    HttpIssuer::new(&server.uri(), Duration::from_secs(5), 4).unwrap()
}

mod classification_tests {
    use super::*;

    #[tokio::test]
    async fn test_home_fallback_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/home"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FALLBACK",
                "sections": []
            })))
            .mount(&server)
            .await;

        let home = endpoint::home();
        let response = issuer_for(&server).issue(&home).await;
        assert_eq!(response.status, 200);

        let classification =
            ResponseClassifier::default().classify(&home, response.status, response.body.as_deref());
        assert_eq!(classification, Classification::Fallback(FallbackKind::Marker));
    }

    #[tokio::test]
    async fn test_empty_page_depends_on_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [],
                "totalElements": 0
            })))
            .mount(&server)
            .await;

        let images = endpoint::images();
        let response = issuer_for(&server).issue(&images).await;
        let body = response.body.as_deref();

        assert_eq!(
            ResponseClassifier::new(EmptyResultPolicy::Fallback).classify(&images, response.status, body),
            Classification::Fallback(FallbackKind::EmptyResult)
        );
        assert_eq!(
            ResponseClassifier::new(EmptyResultPolicy::Success).classify(&images, response.status, body),
            Classification::Success
        );
    }

    #[tokio::test]
    async fn test_populated_page_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"id": 1}, {"id": 2}],
                "totalElements": 2
            })))
            .mount(&server)
            .await;

        let images = endpoint::images();
        let response = issuer_for(&server).issue(&images).await;
        let classification =
            ResponseClassifier::default().classify(&images, response.status, response.body.as_deref());
        assert_eq!(classification, Classification::Success);
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let categories = endpoint::categories();
        let response = issuer_for(&server).issue(&categories).await;
        let classification = ResponseClassifier::default().classify(
            &categories,
            response.status,
            response.body.as_deref(),
        );
        assert_eq!(classification, Classification::ServerError);
        assert!(classification.is_failure());
    }

    #[tokio::test]
    async fn test_themes_not_found_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories/1/themes"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let themes = endpoint::themes();
        let response = issuer_for(&server).issue(&themes).await;
        let classification =
            ResponseClassifier::default().classify(&themes, response.status, response.body.as_deref());
        assert_eq!(classification, Classification::Success);
    }
}

mod request_shape_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_sends_rotation_term() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images/search"))
            .and(query_param("q", "navidad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"id": 7}],
                "totalElements": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let search = endpoint::search(&["navidad"]);
        let response = issuer_for(&server).issue(&search).await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({
                "username": "test_user",
                "password": "test_password"
            })))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let login = endpoint::login();
        let response = issuer_for(&server).issue(&login).await;
        assert_eq!(response.status, 401);

        // Rejected credentials are an expected answer, not a failure
        let classification =
            ResponseClassifier::default().classify(&login, response.status, response.body.as_deref());
        assert_eq!(classification, Classification::Success);
    }

    #[tokio::test]
    async fn test_login_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let login = endpoint::login();
        let response = issuer_for(&server).issue(&login).await;
        let classification =
            ResponseClassifier::default().classify(&login, response.status, response.body.as_deref());
        assert_eq!(classification, Classification::RateLimited);
        assert!(!classification.is_failure());
    }
}

mod driver_tests {
    use super::*;

    #[tokio::test]
    async fn test_constant_run_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/home"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "FALLBACK"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actuator/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "UP"})))
            .mount(&server)
            .await;

        let mut config = HarnessConfig::new(
            "mock",
            LoadProfile::Constant {
                actors: 2,
                duration_secs: 1,
            },
            vec![endpoint::home(), endpoint::health()],
        )
        .with_target(&server.uri());
        config.pause_ms = 50;

        let driver = ScenarioDriver::new(config).unwrap();
        let report = driver.run().await;

        assert!(report.total_requests > 0);
        assert_eq!(report.failures, 0);
        assert_eq!(report.rate_limited, 0);
        assert_eq!(report.total_requests, report.fallbacks + report.successes);
        assert_eq!(report.marker_fallbacks, report.fallbacks);
        assert!(report.iterations_completed > 0);
        assert_eq!(report.peak_actors, 2);

        let thresholds = report.evaluate(&Default::default());
        assert!(thresholds.passes);
    }

    #[tokio::test]
    async fn test_rate_limited_run_reports_engaged_limiter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let mut config = HarnessConfig::new(
            "throttled",
            LoadProfile::ArrivalRate {
                rate_per_sec: 10.0,
                duration_secs: 1,
                max_actors: 5,
            },
            vec![endpoint::login()],
        )
        .with_target(&server.uri());
        config.pause_ms = 0;

        let issuer: Arc<dyn RequestIssuer> = Arc::new(issuer_for(&server));
        let driver = ScenarioDriver::with_issuer(config, issuer).unwrap();
        let report = driver.run().await;

        assert!(report.rate_limited > 0);
        assert_eq!(report.rate_limited, report.total_requests);
        assert_eq!(report.failures, 0);
        assert_eq!(report.checks_failed, 0);
        assert!(report.rate_limiter.message().contains("rate limiter"));
    }
}

mod config_file_tests {
    use super::*;

    #[test]
    fn test_demo_scenario_parses() {
        let config =
            HarnessConfig::from_toml_str(include_str!("../../../demos/harness.toml")).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.name, "browse");
        assert_eq!(config.endpoints.len(), 4);
        assert_eq!(config.profile.peak_actors(), 20);
        assert_eq!(config.profile.total_duration(), Duration::from_secs(50));
        assert_eq!(config.empty_result_policy, EmptyResultPolicy::Fallback);
    }
}
