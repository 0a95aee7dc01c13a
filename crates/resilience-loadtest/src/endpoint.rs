//! Endpoint specifications and the images API endpoint catalog

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Search terms rotated over by the search endpoint
pub const SEARCH_TERMS: [&str; 4] = ["amor", "feliz", "navidad", "cumple"];

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// How a successful body is recognised as a degraded payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackRule {
    /// The body is not inspected
    #[default]
    None,

    /// Object whose `field` holds `value`, e.g. `{"type": "FALLBACK"}`
    Marker { field: String, value: String },

    /// JSON array; an empty array is an empty result
    EmptyList,

    /// Paginated envelope `{"content": [...], "totalElements": n}`
    EmptyPage,
}

/// Query parameter whose value is picked at random for each request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRotation {
    pub param: String,
    pub values: Vec<String>,
}

/// One endpoint exercised by every actor iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Name used in logs and the report
    pub name: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Path relative to the target URL
    pub path: String,

    #[serde(default)]
    pub query: Option<QueryRotation>,

    /// JSON request body
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    #[serde(default = "default_accepted_statuses")]
    pub accepted_statuses: Vec<u16>,

    #[serde(default)]
    pub fallback: FallbackRule,
}

fn default_accepted_statuses() -> Vec<u16> {
    vec![200]
}

impl EndpointSpec {
    /// GET endpoint accepting 200 with no fallback rule
    pub fn get(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method: HttpMethod::Get,
            path: path.to_string(),
            query: None,
            body: None,
            accepted_statuses: default_accepted_statuses(),
            fallback: FallbackRule::None,
        }
    }

    /// POST endpoint sending a JSON body
    pub fn post(name: &str, path: &str, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(name, path)
        }
    }

    pub fn accepting(mut self, statuses: &[u16]) -> Self {
        self.accepted_statuses = statuses.to_vec();
        self
    }

    pub fn with_fallback(mut self, rule: FallbackRule) -> Self {
        self.fallback = rule;
        self
    }

    pub fn with_query(mut self, param: &str, values: &[&str]) -> Self {
        self.query = Some(QueryRotation {
            param: param.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_statuses.contains(&status)
    }

    /// Pick the query pair for the next request
    pub fn pick_query(&self) -> Option<(&str, &str)> {
        let rotation = self.query.as_ref()?;
        let value = rotation.values.choose(&mut rand::thread_rng())?;
        Some((rotation.param.as_str(), value.as_str()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath {
                endpoint: self.name.clone(),
                path: self.path.clone(),
            });
        }

        if self.accepted_statuses.is_empty() {
            return Err(ConfigError::NoAcceptedStatuses(self.name.clone()));
        }

        if let Some(status) = self
            .accepted_statuses
            .iter()
            .copied()
            .find(|s| !(100..=599).contains(s))
        {
            return Err(ConfigError::InvalidStatus {
                endpoint: self.name.clone(),
                status,
            });
        }

        if let Some(rotation) = &self.query {
            if rotation.values.is_empty() {
                return Err(ConfigError::EmptyQueryValues(self.name.clone()));
            }
        }

        Ok(())
    }
}

// ============================================================================
// IMAGES API CATALOG
// ============================================================================

/// `GET /api/home`, fallback marked by `type == "FALLBACK"`
pub fn home() -> EndpointSpec {
    EndpointSpec::get("home", "/api/home").with_fallback(FallbackRule::Marker {
        field: "type".to_string(),
        value: "FALLBACK".to_string(),
    })
}

/// `GET /api/categories`
pub fn categories() -> EndpointSpec {
    EndpointSpec::get("categories", "/api/categories").with_fallback(FallbackRule::EmptyList)
}

/// `GET /api/categories/1/themes`; 404 is valid when the category is missing
pub fn themes() -> EndpointSpec {
    EndpointSpec::get("themes", "/api/categories/1/themes")
        .accepting(&[200, 404])
        .with_fallback(FallbackRule::EmptyList)
}

/// `GET /api/images`
pub fn images() -> EndpointSpec {
    EndpointSpec::get("images", "/api/images").with_fallback(FallbackRule::EmptyPage)
}

/// `GET /api/images/search?q=<term>`
pub fn search(terms: &[&str]) -> EndpointSpec {
    EndpointSpec::get("search", "/api/images/search")
        .with_query("q", terms)
        .with_fallback(FallbackRule::EmptyPage)
}

/// `POST /api/auth/login`, throttled with 429 by the rate limiter
pub fn login() -> EndpointSpec {
    EndpointSpec::post(
        "login",
        "/api/auth/login",
        serde_json::json!({
            "username": "test_user",
            "password": "test_password"
        }),
    )
    .accepting(&[200, 401, 403])
}

/// `GET /actuator/health`
pub fn health() -> EndpointSpec {
    EndpointSpec::get("health", "/actuator/health")
}
