//! Explicit batching over an [`HttpLink`].
//!
//! All queued procedures travel in one request:
//! - queries: `GET {url}/{p0},{p1}?batch=1&input={"0":..,"1":..}`
//! - mutations: `POST {url}/{p0},{p1}?batch=1` with `{"0":..,"1":..}` as body
//!
//! The server answers with a JSON array holding one envelope per procedure,
//! in request order. A batch carries a single operation type.

use crate::http::{HttpFailure, HttpResponse};
use crate::http_link::HttpLink;
use rpclink_core::{
    join_path, CancellationToken, ClientError, Envelope, Operation, OperationId, OperationType,
    TransportError,
};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// A single procedure queued in a batch.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub index: usize,
    pub path: Vec<String>,
    pub input: Option<Value>,
}

/// Handle for a queued procedure's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingResult {
    pub index: usize,
}

/// Builder for a batch of same-typed operations.
pub struct BatchBuilder<'a> {
    link: &'a HttpLink,
    kind: Option<OperationType>,
    operations: Vec<BatchOperation>,
    signal: Option<CancellationToken>,
}

impl<'a> BatchBuilder<'a> {
    pub(crate) fn new(link: &'a HttpLink) -> Self {
        Self {
            link,
            kind: None,
            operations: Vec::new(),
            signal: None,
        }
    }

    /// Abort the whole batch once `token` is cancelled.
    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    /// Queue a query; fails if mutations are already queued.
    pub fn query(&mut self, path: &str, input: Option<Value>) -> Result<PendingResult, ClientError> {
        self.push(OperationType::Query, path, input)
    }

    /// Queue a mutation; fails if queries are already queued.
    pub fn mutation(
        &mut self,
        path: &str,
        input: Option<Value>,
    ) -> Result<PendingResult, ClientError> {
        self.push(OperationType::Mutation, path, input)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn push(
        &mut self,
        kind: OperationType,
        path: &str,
        input: Option<Value>,
    ) -> Result<PendingResult, ClientError> {
        match self.kind {
            Some(existing) if existing != kind => {
                return Err(ClientError::unsupported(format!(
                    "Cannot mix {} and {} operations in one batch",
                    existing, kind
                )));
            }
            _ => self.kind = Some(kind),
        }

        let index = self.operations.len();
        self.operations.push(BatchOperation {
            index,
            path: rpclink_core::split_path(path),
            input,
        });
        Ok(PendingResult { index })
    }

    /// Send the batch and collect one envelope per queued procedure.
    pub async fn execute(self) -> Result<BatchResults, ClientError> {
        let Some(kind) = self.kind else {
            return Ok(BatchResults {
                envelopes: Vec::new(),
                status: None,
            });
        };

        let paths = self
            .operations
            .iter()
            .map(|op| join_path(&op.path))
            .collect::<Vec<_>>()
            .join(",");

        let mut inputs = Map::new();
        for op in &self.operations {
            if let Some(input) = &op.input {
                inputs.insert(op.index.to_string(), input.clone());
            }
        }
        let inputs = serde_json::to_string(&Value::Object(inputs))?;

        // Header functions see one synthetic operation spanning the whole batch.
        let batch_op = Operation::new(OperationId::new(0), kind, vec![paths.clone()]);
        let headers = self.link.request_headers(&batch_op);

        let (url, body) = match kind {
            OperationType::Query => (
                self.link
                    .procedure_url(&paths, &[("batch", "1".to_string()), ("input", inputs)])?,
                None,
            ),
            OperationType::Mutation => (
                self.link
                    .procedure_url(&paths, &[("batch", "1".to_string())])?,
                Some(inputs),
            ),
            OperationType::Subscription => {
                return Err(ClientError::unsupported(
                    "Subscriptions cannot be batched",
                ));
            }
        };

        debug!(
            "Sending batch request to {}: {} operations",
            url,
            self.operations.len()
        );
        trace!("Batch body: {:?}", body);

        let outcome = self
            .link
            .exchange(kind, &url, body, &headers, self.signal.as_ref())
            .await?;
        let (status, items) = interpret_batch(outcome)?;

        if items.len() != self.operations.len() {
            return Err(ClientError::MalformedResponse {
                status,
                reason: format!(
                    "expected {} envelopes, got {}",
                    self.operations.len(),
                    items.len()
                ),
            });
        }

        let envelopes = items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<Envelope>(item).map_err(|e| {
                    ClientError::MalformedResponse {
                        status,
                        reason: format!("batch item is not an envelope: {}", e),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Received {} batch results", envelopes.len());
        Ok(BatchResults {
            envelopes,
            status: Some(status),
        })
    }
}

fn interpret_batch(
    outcome: Result<HttpResponse, HttpFailure>,
) -> Result<(u16, Vec<Value>), ClientError> {
    match outcome {
        Ok(response) => match response.body {
            Some(Value::Array(items)) => Ok((response.status, items)),
            other => Err(ClientError::MalformedResponse {
                status: response.status,
                reason: format!("expected a JSON array of envelopes, got {:?}", other),
            }),
        },
        // Servers answer partially failed batches with a non-2xx status but
        // still send one envelope per item.
        Err(HttpFailure {
            status,
            error: Some(Value::Array(items)),
            ..
        }) => Ok((status, items)),
        Err(failure) => Err(TransportError::from(failure).into()),
    }
}

/// Results from a batch execution
#[derive(Debug)]
pub struct BatchResults {
    envelopes: Vec<Envelope>,
    status: Option<u16>,
}

impl BatchResults {
    /// Data of a queued procedure, or its server error.
    pub fn get(&self, pending: &PendingResult) -> Result<Value, ClientError> {
        match self.envelopes.get(pending.index) {
            Some(Envelope::Result(result)) => Ok(result.data.clone()),
            Some(Envelope::Error(shape)) => Err(ClientError::server(shape.clone(), self.status)),
            None => Err(ClientError::MalformedResponse {
                status: self.status.unwrap_or_default(),
                reason: format!("no result for batch item {}", pending.index),
            }),
        }
    }

    pub fn envelope(&self, pending: &PendingResult) -> Option<&Envelope> {
        self.envelopes.get(pending.index)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}
