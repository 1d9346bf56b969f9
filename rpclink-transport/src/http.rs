//! The host HTTP client collaborator.
//!
//! Links never talk to the network directly; they go through an injected
//! [`HttpClient`]. Successful exchanges come back as [`HttpResponse`], anything
//! else (non-2xx, connection failure, undecodable body) arrives on the error
//! channel as an [`HttpFailure`].

use async_trait::async_trait;
use indexmap::IndexMap;
use rpclink_core::{ClientError, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Ordered header map; later inserts of the same name replace earlier ones.
pub type Headers = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Http failure response ({status} {status_text}): {message}")]
pub struct HttpFailure {
    /// `0` when no response was received.
    pub status: u16,
    pub status_text: String,
    /// Response body, parsed as JSON when possible, otherwise as a string.
    pub error: Option<Value>,
    pub message: String,
}

impl HttpFailure {
    pub fn network(message: impl Into<String>) -> Self {
        HttpFailure {
            status: 0,
            status_text: "Unknown Error".to_string(),
            error: None,
            message: message.into(),
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<HttpFailure> for TransportError {
    fn from(failure: HttpFailure) -> Self {
        if failure.status == 0 {
            TransportError {
                status: 0,
                status_text: failure.status_text,
                body: failure.error,
                message: failure.message,
            }
        } else {
            TransportError::new(failure.status, failure.status_text, failure.error)
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse, HttpFailure>;

    async fn post(
        &self,
        url: &str,
        body: Option<String>,
        headers: &Headers,
    ) -> Result<HttpResponse, HttpFailure>;
}

/// Settings for [`ReqwestHttpClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            user_agent: None,
        }
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let inner = builder.build().map_err(|e| {
            ClientError::configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { inner })
    }

    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        url: &str,
        headers: &Headers,
    ) -> Result<HttpResponse, HttpFailure> {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpFailure::network(format!("Failed to send HTTP request: {}", e)))?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let response_headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let text = response.text().await.map_err(|e| HttpFailure {
            status: status.as_u16(),
            status_text: status_text.clone(),
            error: None,
            message: format!("Failed to read response body: {}", e),
        })?;
        trace!("Response body from {}:\n{}", url, text);

        if !status.is_success() {
            debug!("HTTP error {} from {}", status, url);
            return Err(HttpFailure {
                status: status.as_u16(),
                message: format!("Http failure response for {}: {} {}", url, status.as_u16(), status_text),
                status_text,
                error: parse_lenient(&text),
            });
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(e) => {
                    return Err(HttpFailure {
                        status: status.as_u16(),
                        status_text,
                        error: Some(Value::String(text)),
                        message: format!("Http failure during parsing for {}: {}", url, e),
                    })
                }
            }
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            headers: response_headers,
            body,
        })
    }
}

/// JSON when it parses, the raw text otherwise, nothing for an empty body.
fn parse_lenient(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse, HttpFailure> {
        self.send(self.inner.get(url), url, headers).await
    }

    async fn post(
        &self,
        url: &str,
        body: Option<String>,
        headers: &Headers,
    ) -> Result<HttpResponse, HttpFailure> {
        let mut request = self.inner.post(url);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.send(request, url, headers).await
    }
}
