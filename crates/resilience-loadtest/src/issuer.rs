//! Request issuing
//!
//! A network failure is reported as status [`STATUS_UNREACHABLE`] with the
//! error kept for the report, so callers classify every request the same way.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::classifier::STATUS_UNREACHABLE;
use crate::endpoint::{EndpointSpec, HttpMethod};
use crate::error::Result;

/// What came back from one request
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status, or 0 when no response arrived
    pub status: u16,
    pub latency: Duration,
    /// Body text; `None` when it could not be read
    pub body: Option<String>,
    /// Transport error category for unreachable requests
    pub error: Option<String>,
}

impl RawResponse {
    pub fn unreachable(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            status: STATUS_UNREACHABLE,
            latency,
            body: None,
            error: Some(error.into()),
        }
    }
}

/// Sends one request for an endpoint
#[async_trait]
pub trait RequestIssuer: Send + Sync {
    async fn issue(&self, endpoint: &EndpointSpec) -> RawResponse;
}

/// [`RequestIssuer`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIssuer {
    pub fn new(base_url: &str, request_timeout: Duration, max_idle_per_host: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, endpoint: &EndpointSpec) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let mut request = match endpoint.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };

        if let Some((param, value)) = endpoint.pick_query() {
            request = request.query(&[(param, value)]);
        }
        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }

        request
    }
}

#[async_trait]
impl RequestIssuer for HttpIssuer {
    async fn issue(&self, endpoint: &EndpointSpec) -> RawResponse {
        let start = Instant::now();

        match self.request(endpoint).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = match response.text().await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        debug!("{}: failed to read body: {}", endpoint.name, e);
                        None
                    }
                };

                RawResponse {
                    status,
                    latency: start.elapsed(),
                    body,
                    error: None,
                }
            }
            Err(e) => {
                debug!("{} {}: {}", endpoint.method.as_str(), endpoint.path, e);
                RawResponse::unreachable(start.elapsed(), error_category(&e))
            }
        }
    }
}

fn error_category(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else if error.is_request() {
        "request"
    } else {
        "transport"
    }
}
