//! Composable link chain.
//!
//! A link receives an [`Operation`] together with a [`Next`] handle to the
//! rest of the chain. Intermediate links (logging, routing) forward to `next`;
//! terminating links (such as [`HttpLink`](crate::HttpLink)) perform the
//! exchange and ignore it.

use crate::http::Headers;
use async_trait::async_trait;
use futures::stream::BoxStream;
use rpclink_core::{ClientError, Envelope, Operation};
use std::fmt;
use std::sync::Arc;

/// Items produced by a streaming link, in arrival order.
pub type EnvelopeStream = BoxStream<'static, Result<Envelope, ClientError>>;

/// Transport details observed alongside an envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub status: Option<u16>,
    pub headers: Headers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub envelope: Envelope,
    pub meta: ResponseMeta,
}

impl OperationResponse {
    pub fn new(envelope: Envelope) -> Self {
        OperationResponse {
            envelope,
            meta: ResponseMeta::default(),
        }
    }
}

pub enum LinkResponse {
    /// A single envelope, the shape of every query and mutation over HTTP.
    Unary(OperationResponse),
    /// Zero or more envelopes; used by subscriptions and streamed queries.
    Stream(EnvelopeStream),
}

impl fmt::Debug for LinkResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkResponse::Unary(response) => f.debug_tuple("Unary").field(response).finish(),
            LinkResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[async_trait]
pub trait Link: Send + Sync {
    async fn call(&self, op: Operation, next: Next<'_>) -> Result<LinkResponse, ClientError>;
}

/// The remainder of a chain after the current link.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    links: &'a [Arc<dyn Link>],
}

impl<'a> Next<'a> {
    /// An empty remainder; forwarding from it is a configuration error.
    pub fn terminal() -> Self {
        Next { links: &[] }
    }

    pub fn is_terminal(&self) -> bool {
        self.links.is_empty()
    }

    pub async fn run(self, op: Operation) -> Result<LinkResponse, ClientError> {
        match self.links.split_first() {
            Some((link, rest)) => link.call(op, Next { links: rest }).await,
            None => Err(ClientError::configuration(format!(
                "Link chain ended without a terminating link for `{}`",
                op.path_string()
            ))),
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.links.len())
            .finish()
    }
}

/// An ordered, shareable list of links.
#[derive(Clone)]
pub struct LinkChain {
    links: Arc<[Arc<dyn Link>]>,
}

impl LinkChain {
    pub fn new(links: Vec<Arc<dyn Link>>) -> Result<Self, ClientError> {
        if links.is_empty() {
            return Err(ClientError::configuration(
                "A link chain needs at least one link",
            ));
        }
        Ok(LinkChain {
            links: links.into(),
        })
    }

    pub fn single(link: impl Link + 'static) -> Self {
        let links: Vec<Arc<dyn Link>> = vec![Arc::new(link)];
        LinkChain {
            links: links.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub async fn execute(&self, op: Operation) -> Result<LinkResponse, ClientError> {
        Next { links: &self.links }.run(op).await
    }
}

impl fmt::Debug for LinkChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkChain")
            .field("links", &self.links.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpclink_core::{OperationId, OperationType};
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Link for Recording {
        async fn call(&self, op: Operation, next: Next<'_>) -> Result<LinkResponse, ClientError> {
            self.seen.lock().unwrap().push(self.name);
            next.run(op).await
        }
    }

    struct Echo;

    #[async_trait]
    impl Link for Echo {
        async fn call(&self, op: Operation, _next: Next<'_>) -> Result<LinkResponse, ClientError> {
            Ok(LinkResponse::Unary(OperationResponse::new(Envelope::data(
                json!({"path": op.path_string(), "input": op.input}),
            ))))
        }
    }

    fn op(path: &str) -> Operation {
        Operation::new(
            OperationId::new(1),
            OperationType::Query,
            rpclink_core::split_path(path),
        )
        .with_input(Some(json!(1)))
    }

    #[tokio::test]
    async fn test_links_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let links: Vec<Arc<dyn Link>> = vec![
            Arc::new(Recording { name: "first", seen: seen.clone() }),
            Arc::new(Recording { name: "second", seen: seen.clone() }),
            Arc::new(Echo),
        ];
        let chain = LinkChain::new(links).unwrap();

        let response = chain.execute(op("posts.list")).await.unwrap();
        let LinkResponse::Unary(response) = response else {
            panic!("expected a unary response");
        };

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(
            response.envelope,
            Envelope::data(json!({"path": "posts.list", "input": 1}))
        );
    }

    #[tokio::test]
    async fn test_chain_without_terminating_link() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let links: Vec<Arc<dyn Link>> = vec![Arc::new(Recording { name: "only", seen })];
        let chain = LinkChain::new(links).unwrap();

        let err = chain.execute(op("hello")).await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
        assert!(err.to_string().contains("hello"));
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(matches!(
            LinkChain::new(Vec::new()),
            Err(ClientError::Configuration(_))
        ));
        assert!(Next::terminal().is_terminal());
    }
}
