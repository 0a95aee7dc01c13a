//! Response classification
//!
//! Maps `(status, body)` to exactly one [`Classification`]. Bodies are decoded
//! into the shape the endpoint's [`FallbackRule`] declares; a body that does not
//! fit is reported as [`Classification::Unrecognized`] rather than passed off
//! as a success.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointSpec, FallbackRule};

/// Status reported when no HTTP response was received
pub const STATUS_UNREACHABLE: u16 = 0;

/// Status returned by the target's rate limiter
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Classified outcome of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    Fallback(FallbackKind),
    RateLimited,
    ServerError,
    ClientError,
    Unreachable,
    /// Accepted status, but the body did not decode into the expected shape
    Unrecognized,
}

/// Why a response was read as a degraded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// The payload marks itself as a fallback
    Marker,
    /// Empty list or empty page
    EmptyResult,
}

impl Classification {
    /// Counts against the HTTP success rate
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Classification::ServerError | Classification::ClientError | Classification::Unreachable
        )
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::Fallback(FallbackKind::Marker) => "fallback_marker",
            Classification::Fallback(FallbackKind::EmptyResult) => "fallback_empty",
            Classification::RateLimited => "rate_limited",
            Classification::ServerError => "server_error",
            Classification::ClientError => "client_error",
            Classification::Unreachable => "unreachable",
            Classification::Unrecognized => "unrecognized",
        }
    }
}

/// How empty lists and empty pages are read.
///
/// The target returns an empty result both when its store is down and when a
/// query legitimately matches nothing, so this cannot be decided from the
/// response alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Empty results count as fallbacks
    #[default]
    Fallback,
    /// Empty results count as plain successes
    Success,
}

impl EmptyResultPolicy {
    pub fn describe(&self) -> &'static str {
        match self {
            EmptyResultPolicy::Fallback => "empty results counted as fallbacks",
            EmptyResultPolicy::Success => "empty results counted as successes",
        }
    }
}

#[derive(Deserialize)]
struct Page {
    content: Vec<IgnoredAny>,
    #[serde(rename = "totalElements")]
    total_elements: u64,
}

enum Shape {
    Marked(bool),
    Empty(bool),
}

/// Stateless classifier applying one [`EmptyResultPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier {
    policy: EmptyResultPolicy,
}

impl ResponseClassifier {
    pub fn new(policy: EmptyResultPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EmptyResultPolicy {
        self.policy
    }

    pub fn classify(&self, endpoint: &EndpointSpec, status: u16, body: Option<&str>) -> Classification {
        if status == STATUS_TOO_MANY_REQUESTS {
            return Classification::RateLimited;
        }
        if status >= 500 {
            return Classification::ServerError;
        }
        if status == STATUS_UNREACHABLE {
            return Classification::Unreachable;
        }
        if !endpoint.accepts(status) {
            return Classification::ClientError;
        }
        // Accepted non-2xx statuses (404 on themes) carry no payload to inspect
        if !(200..300).contains(&status) || endpoint.fallback == FallbackRule::None {
            return Classification::Success;
        }

        let Some(body) = body else {
            return Classification::Unrecognized;
        };

        match decode(&endpoint.fallback, body) {
            Some(Shape::Marked(true)) => Classification::Fallback(FallbackKind::Marker),
            Some(Shape::Empty(true)) if self.policy == EmptyResultPolicy::Fallback => {
                Classification::Fallback(FallbackKind::EmptyResult)
            }
            Some(_) => Classification::Success,
            None => Classification::Unrecognized,
        }
    }
}

fn decode(rule: &FallbackRule, body: &str) -> Option<Shape> {
    match rule {
        FallbackRule::None => None,
        FallbackRule::Marker { field, value } => {
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(body).ok()?;
            let marked = object.get(field).and_then(|v| v.as_str()) == Some(value.as_str());
            Some(Shape::Marked(marked))
        }
        FallbackRule::EmptyList => {
            let list: Vec<IgnoredAny> = serde_json::from_str(body).ok()?;
            Some(Shape::Empty(list.is_empty()))
        }
        FallbackRule::EmptyPage => {
            let page: Page = serde_json::from_str(body).ok()?;
            Some(Shape::Empty(page.content.is_empty() && page.total_elements == 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{self, SEARCH_TERMS};
    use proptest::prelude::*;

    fn classify(endpoint: &EndpointSpec, status: u16, body: &str) -> Classification {
        ResponseClassifier::default().classify(endpoint, status, Some(body))
    }

    #[test]
    fn test_empty_page_is_fallback() {
        let search = endpoint::search(&SEARCH_TERMS);
        assert_eq!(
            classify(&search, 200, r#"{"content": [], "totalElements": 0}"#),
            Classification::Fallback(FallbackKind::EmptyResult)
        );
    }

    #[test]
    fn test_populated_page_is_success() {
        let images = endpoint::images();
        let outcome = classify(&images, 200, r#"{"content": [{"id":1}], "totalElements": 1}"#);
        assert_eq!(outcome, Classification::Success);
        assert!(!outcome.is_fallback());
        assert!(!outcome.is_failure());
    }

    #[test]
    fn test_empty_content_with_nonzero_total_is_success() {
        // Past the last page
        let images = endpoint::images();
        assert_eq!(
            classify(&images, 200, r#"{"content": [], "totalElements": 42}"#),
            Classification::Success
        );
    }

    #[test]
    fn test_home_marker() {
        let home = endpoint::home();
        assert_eq!(
            classify(&home, 200, r#"{"type": "FALLBACK", "title": "x", "images": []}"#),
            Classification::Fallback(FallbackKind::Marker)
        );
        assert_eq!(
            classify(&home, 200, r#"{"type": "DEFAULT", "title": "x", "images": []}"#),
            Classification::Success
        );
        assert_eq!(
            classify(&home, 200, r#"{"title": "x"}"#),
            Classification::Success
        );
    }

    #[test]
    fn test_empty_list() {
        let categories = endpoint::categories();
        assert_eq!(
            classify(&categories, 200, "[]"),
            Classification::Fallback(FallbackKind::EmptyResult)
        );
        assert_eq!(
            classify(&categories, 200, r#"[{"id": 1, "name": "Amor"}]"#),
            Classification::Success
        );
    }

    #[test]
    fn test_success_policy_ignores_empty_results() {
        let classifier = ResponseClassifier::new(EmptyResultPolicy::Success);
        let categories = endpoint::categories();
        assert_eq!(
            classifier.classify(&categories, 200, Some("[]")),
            Classification::Success
        );

        // Explicit markers are unaffected by the policy
        let home = endpoint::home();
        assert_eq!(
            classifier.classify(&home, 200, Some(r#"{"type": "FALLBACK"}"#)),
            Classification::Fallback(FallbackKind::Marker)
        );
    }

    #[test]
    fn test_shape_mismatch_is_unrecognized() {
        let images = endpoint::images();
        assert_eq!(classify(&images, 200, "[]"), Classification::Unrecognized);
        assert_eq!(classify(&images, 200, "<html>"), Classification::Unrecognized);

        let home = endpoint::home();
        assert_eq!(classify(&home, 200, "[1, 2]"), Classification::Unrecognized);

        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify(&home, 200, None),
            Classification::Unrecognized
        );

        let outcome = Classification::Unrecognized;
        assert!(!outcome.is_failure());
        assert!(!outcome.is_fallback());
    }

    #[test]
    fn test_status_rules() {
        let themes = endpoint::themes();
        assert_eq!(classify(&themes, 404, ""), Classification::Success);
        assert_eq!(classify(&themes, 400, ""), Classification::ClientError);
        assert_eq!(classify(&themes, 0, ""), Classification::Unreachable);
        assert_eq!(classify(&themes, 503, "[]"), Classification::ServerError);

        let login = endpoint::login();
        assert_eq!(classify(&login, 401, ""), Classification::Success);
        assert_eq!(classify(&login, 429, ""), Classification::RateLimited);
        assert_eq!(classify(&login, 404, ""), Classification::ClientError);
    }

    #[test]
    fn test_rule_none_skips_body() {
        let health = endpoint::health();
        assert_eq!(classify(&health, 200, "not json"), Classification::Success);
    }

    #[test]
    fn test_failure_flags() {
        assert!(Classification::ServerError.is_failure());
        assert!(Classification::ClientError.is_failure());
        assert!(Classification::Unreachable.is_failure());
        assert!(!Classification::RateLimited.is_failure());
        assert!(!Classification::Fallback(FallbackKind::Marker).is_failure());
    }

    proptest! {
        #[test]
        fn prop_429_is_always_rate_limited(body in ".*", policy_success in any::<bool>()) {
            let policy = if policy_success { EmptyResultPolicy::Success } else { EmptyResultPolicy::Fallback };
            let classifier = ResponseClassifier::new(policy);
            for endpoint in [endpoint::home(), endpoint::categories(), endpoint::images(), endpoint::login()] {
                let outcome = classifier.classify(&endpoint, 429, Some(&body));
                prop_assert_eq!(outcome, Classification::RateLimited);
                prop_assert!(!outcome.is_failure());
                prop_assert!(!outcome.is_fallback());
            }
        }

        #[test]
        fn prop_5xx_is_server_error(status in 500u16..600) {
            let classifier = ResponseClassifier::default();
            // Bodies that would be fallbacks on a 200
            for (endpoint, body) in [
                (endpoint::home(), r#"{"type": "FALLBACK"}"#),
                (endpoint::categories(), "[]"),
                (endpoint::images(), r#"{"content": [], "totalElements": 0}"#),
            ] {
                let outcome = classifier.classify(&endpoint, status, Some(body));
                prop_assert_eq!(outcome, Classification::ServerError);
                prop_assert!(outcome.is_failure());
            }
        }
    }
}
