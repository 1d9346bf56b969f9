//! Terminating link that sends queries and mutations over plain HTTP.
//!
//! Wire shape:
//! - query: `GET {url}/{path}?input=<url-encoded JSON>`
//! - mutation: `POST {url}/{path}` with the JSON-encoded input as body
//!
//! Responses are `{"result":{"data":..}}` or `{"error":{..}}` envelopes.

use crate::headers::{merge_headers, HeaderSource};
use crate::http::{
    Headers, HttpClient, HttpClientConfig, HttpFailure, HttpResponse, ReqwestHttpClient,
};
use crate::http_batch::BatchBuilder;
use crate::link::{Link, LinkResponse, Next, OperationResponse, ResponseMeta};
use async_trait::async_trait;
use reqwest::Url;
use rpclink_core::{
    CancellationToken, ClientError, Envelope, Operation, OperationType, TransportError,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpLinkConfig {
    /// Base URL procedures are appended to, e.g. `http://localhost:3000/trpc`
    pub url: String,
    pub headers: HeaderSource,
}

impl HttpLinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderSource::default(),
        }
    }

    pub fn headers(mut self, headers: impl Into<HeaderSource>) -> Self {
        self.headers = headers.into();
        self
    }
}

pub struct HttpLink {
    url: String,
    headers: HeaderSource,
    client: Arc<dyn HttpClient>,
}

impl HttpLink {
    pub fn new(config: HttpLinkConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            headers: config.headers,
            client,
        }
    }

    /// Link backed by a fresh [`ReqwestHttpClient`].
    pub fn with_reqwest(
        config: HttpLinkConfig,
        http_config: HttpClientConfig,
    ) -> Result<Self, ClientError> {
        let client = ReqwestHttpClient::new(http_config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start an explicit batch of queries or mutations sent as one request.
    pub fn batch(&self) -> BatchBuilder<'_> {
        BatchBuilder::new(self)
    }

    pub(crate) fn procedure_url(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            ClientError::configuration(format!("Invalid URL `{}`: {}", self.url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::configuration(format!("URL `{}` cannot be a base", self.url))
            })?
            .pop_if_empty()
            .push(path);
        // Query pairs already on the base URL are kept ahead of ours.
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.into())
    }

    /// Link defaults overlaid with the configured headers for `op`.
    pub(crate) fn request_headers(&self, op: &Operation) -> Headers {
        let mut defaults = Headers::new();
        if op.kind == OperationType::Mutation {
            defaults.insert("Content-Type".to_string(), "application/json".to_string());
        }
        merge_headers(defaults, self.headers.resolve(op))
    }

    /// Run one exchange, racing it against `signal` when one is wired.
    pub(crate) async fn exchange(
        &self,
        kind: OperationType,
        url: &str,
        body: Option<String>,
        headers: &Headers,
        signal: Option<&CancellationToken>,
    ) -> Result<Result<HttpResponse, HttpFailure>, ClientError> {
        let request = async {
            match kind {
                OperationType::Mutation => self.client.post(url, body, headers).await,
                _ => self.client.get(url, headers).await,
            }
        };

        match signal {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Request to {} aborted", url);
                    Err(ClientError::Aborted)
                }
                outcome = request => Ok(outcome),
            },
            None => Ok(request.await),
        }
    }
}

impl fmt::Debug for HttpLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLink")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Classify a single exchange into an envelope or a client error.
pub(crate) fn interpret(
    outcome: Result<HttpResponse, HttpFailure>,
) -> Result<OperationResponse, ClientError> {
    match outcome {
        Ok(response) => {
            let status = response.status;
            let body = response.body.ok_or_else(|| ClientError::MalformedResponse {
                status,
                reason: "empty response body".to_string(),
            })?;
            let envelope: Envelope =
                serde_json::from_value(body).map_err(|e| ClientError::MalformedResponse {
                    status,
                    reason: format!("expected a result or error envelope: {}", e),
                })?;
            Ok(OperationResponse {
                envelope,
                meta: ResponseMeta {
                    status: Some(status),
                    headers: response.headers,
                },
            })
        }
        Err(failure) => {
            if let Some(envelope @ Envelope::Error(_)) =
                failure.error.as_ref().and_then(Envelope::from_value)
            {
                return Ok(OperationResponse {
                    envelope,
                    meta: ResponseMeta {
                        status: Some(failure.status),
                        headers: Headers::new(),
                    },
                });
            }
            if failure.is_success_status() {
                return Err(ClientError::MalformedResponse {
                    status: failure.status,
                    reason: failure.message,
                });
            }
            warn!("HTTP transport failure: {}", failure);
            Err(TransportError::from(failure).into())
        }
    }
}

#[async_trait]
impl Link for HttpLink {
    async fn call(&self, op: Operation, _next: Next<'_>) -> Result<LinkResponse, ClientError> {
        let path = op.path_string();
        let (url, body) = match op.kind {
            OperationType::Subscription => {
                return Err(ClientError::unsupported(
                    "Subscriptions are unsupported by `HttpLink`",
                ));
            }
            OperationType::Query => {
                let query = match &op.input {
                    Some(input) => vec![("input", serde_json::to_string(input)?)],
                    None => Vec::new(),
                };
                (self.procedure_url(&path, &query)?, None)
            }
            OperationType::Mutation => {
                let body = op.input.as_ref().map(serde_json::to_string).transpose()?;
                (self.procedure_url(&path, &[])?, body)
            }
        };
        let headers = self.request_headers(&op);

        debug!(id = %op.id, kind = %op.kind, "Sending {} {}", op.kind, url);
        let outcome = self
            .exchange(op.kind, &url, body, &headers, op.signal.as_ref())
            .await?;

        interpret(outcome).map(LinkResponse::Unary)
    }
}
