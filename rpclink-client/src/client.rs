// rpclink client
// Runs operations through a link chain and unwraps the response envelopes:
// - UntypedClient: path + JSON input, no contract
// - Client: contract-aware, with path proxies and typed procedures

use crate::contract::{Contract, Procedure, ProcedureKind};
use crate::proxy::{PathProxy, TypedProcedure};
use futures::stream::{self, BoxStream, StreamExt};
use rpclink_core::{
    split_path, CancellationToken, ClientError, Envelope, Operation, OperationIdAllocator,
    OperationType,
};
use rpclink_transport::{
    EnvelopeStream, HttpClientConfig, HttpLink, HttpLinkConfig, Link, LinkChain, LinkResponse,
    OperationResponse,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Data items of a subscription, in arrival order.
pub type DataStream = BoxStream<'static, Result<Value, ClientError>>;

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Context handed to every link along with the operation
    pub context: Map<String, Value>,
    /// Cancelling this token aborts the call with [`ClientError::Aborted`]
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Untyped entry point: dotted path plus JSON input.
#[derive(Debug, Clone)]
pub struct UntypedClient {
    chain: LinkChain,
    ids: Arc<OperationIdAllocator>,
}

impl UntypedClient {
    pub fn new(chain: LinkChain) -> Self {
        Self {
            chain,
            ids: Arc::new(OperationIdAllocator::new()),
        }
    }

    pub fn from_links(links: Vec<Arc<dyn Link>>) -> Result<Self, ClientError> {
        Ok(Self::new(LinkChain::new(links)?))
    }

    pub fn chain(&self) -> &LinkChain {
        &self.chain
    }

    /// Build an operation and run it through the chain, returning the raw link
    /// response.
    pub async fn request(
        &self,
        kind: OperationType,
        path: &str,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<LinkResponse, ClientError> {
        let op = Operation::new(self.ids.allocate(), kind, split_path(path))
            .with_input(input)
            .with_context(options.context)
            .with_signal(options.signal);

        if op.is_cancelled() {
            debug!(id = %op.id, "Operation cancelled before dispatch");
            return Err(ClientError::Aborted);
        }

        debug!(id = %op.id, kind = %op.kind, "Dispatching {}", op.path_string());
        trace!("Operation input: {:?}", op.input);
        self.chain.execute(op).await
    }

    pub async fn query(
        &self,
        path: &str,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let signal = options.signal.clone();
        let response = self
            .request(OperationType::Query, path, input, options)
            .await?;
        into_value(response, signal).await
    }

    pub async fn mutation(
        &self,
        path: &str,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let signal = options.signal.clone();
        let response = self
            .request(OperationType::Mutation, path, input, options)
            .await?;
        into_value(response, signal).await
    }

    /// Start a subscription. The stream ends when the server completes it or
    /// the signal in `options` is cancelled.
    pub async fn subscription(
        &self,
        path: &str,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<DataStream, ClientError> {
        let signal = options.signal.clone();
        let response = self
            .request(OperationType::Subscription, path, input, options)
            .await?;

        let items = match response {
            LinkResponse::Stream(envelopes) => data_stream(envelopes),
            LinkResponse::Unary(response) => stream::once(async move { unwrap_response(response) }).boxed(),
        };

        Ok(until_cancelled(items, signal))
    }
}

/// Result data of a unary response, or the server error it carries.
pub fn unwrap_response(response: OperationResponse) -> Result<Value, ClientError> {
    match response.envelope {
        Envelope::Result(result) => Ok(result.data),
        Envelope::Error(shape) => Err(ClientError::server(shape, response.meta.status)),
    }
}

/// Map a stream of envelopes to their data.
pub fn data_stream(envelopes: EnvelopeStream) -> DataStream {
    envelopes
        .map(|item| {
            item.and_then(|envelope| unwrap_response(OperationResponse::new(envelope)))
        })
        .boxed()
}

/// Drain a streamed result into one JSON array, stopping at the first error.
///
/// Every item is held in memory until the producer finishes; an unbounded
/// producer grows without limit.
pub async fn collect_stream(mut items: DataStream) -> Result<Value, ClientError> {
    let mut collected = Vec::new();
    while let Some(item) = items.next().await {
        collected.push(item?);
    }
    Ok(Value::Array(collected))
}

/// End `items` once `signal` is cancelled.
fn until_cancelled(items: DataStream, signal: Option<CancellationToken>) -> DataStream {
    match signal {
        Some(signal) => items.take_until(signal.cancelled_owned()).boxed(),
        None => items,
    }
}

/// A streamed result cut short by the signal is an abort, never a partial array.
async fn into_value(
    response: LinkResponse,
    signal: Option<CancellationToken>,
) -> Result<Value, ClientError> {
    match response {
        LinkResponse::Unary(response) => unwrap_response(response),
        LinkResponse::Stream(envelopes) => {
            let collected =
                collect_stream(until_cancelled(data_stream(envelopes), signal.clone())).await;
            if signal.is_some_and(|signal| signal.is_cancelled()) {
                debug!("Streamed result aborted");
                return Err(ClientError::Aborted);
            }
            collected
        }
    }
}

/// Contract-aware client.
///
/// Without a contract every path is accepted and the terminal method alone
/// decides the operation type.
#[derive(Debug, Clone)]
pub struct Client {
    untyped: UntypedClient,
    contract: Option<Arc<Contract>>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn untyped(&self) -> &UntypedClient {
        &self.untyped
    }

    pub fn contract(&self) -> Option<&Contract> {
        self.contract.as_deref()
    }

    /// Start a path traversal, e.g. `client.at("posts").at("byId")`.
    pub fn at(&self, segment: &str) -> PathProxy<'_> {
        PathProxy::root(self).at(segment)
    }

    pub fn procedure<I, O>(&self, procedure: &Procedure<I, O>) -> TypedProcedure<'_, I, O> {
        TypedProcedure::new(self, *procedure)
    }

    /// Check `path` against the contract for a call of `kind`.
    pub(crate) fn check(&self, path: &str, kind: ProcedureKind) -> Result<(), ClientError> {
        let Some(contract) = &self.contract else {
            return Ok(());
        };
        match contract.get(path) {
            None => Err(ClientError::UnknownProcedure(path.to_string())),
            Some(declared) if declared != kind => Err(ClientError::unsupported(format!(
                "`{}` is a {}; call `{}` instead of `{}`",
                path,
                declared,
                declared.method(),
                kind.method()
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    links: Vec<Arc<dyn Link>>,
    contract: Option<Contract>,
}

impl ClientBuilder {
    pub fn link(mut self, link: impl Link + 'static) -> Self {
        self.links.push(Arc::new(link));
        self
    }

    pub fn shared_link(mut self, link: Arc<dyn Link>) -> Self {
        self.links.push(link);
        self
    }

    /// Terminate the chain with an [`HttpLink`] backed by reqwest.
    pub fn http(self, url: &str) -> Result<Self, ClientError> {
        let link = HttpLink::with_reqwest(HttpLinkConfig::new(url), HttpClientConfig::default())?;
        Ok(self.link(link))
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let untyped = UntypedClient::from_links(self.links)?;
        debug!(links = untyped.chain().len(), "Client created");
        Ok(Client {
            untyped,
            contract: self.contract.map(Arc::new),
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("links", &self.links.len())
            .field("contract", &self.contract)
            .finish()
    }
}
