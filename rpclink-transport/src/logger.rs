use crate::link::{Link, LinkResponse, Next};
use async_trait::async_trait;
use rpclink_core::{ClientError, Operation, OperationType};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Direction of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDirection {
    Up,
    Down,
}

pub type LogPredicate = Arc<dyn Fn(&Operation, LogDirection) -> bool + Send + Sync>;

/// Intermediate link that logs every operation going up the chain and its
/// outcome coming back down, then forwards unchanged.
#[derive(Clone, Default)]
pub struct LoggerLink {
    enabled: Option<LogPredicate>,
}

impl LoggerLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only log events for which `predicate` returns true.
    pub fn enabled<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Operation, LogDirection) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(predicate));
        self
    }

    fn is_enabled(&self, op: &Operation, direction: LogDirection) -> bool {
        self.enabled
            .as_ref()
            .map_or(true, |predicate| predicate(op, direction))
    }
}

impl fmt::Debug for LoggerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerLink")
            .field("filtered", &self.enabled.is_some())
            .finish()
    }
}

#[async_trait]
impl Link for LoggerLink {
    async fn call(&self, op: Operation, next: Next<'_>) -> Result<LinkResponse, ClientError> {
        let id = op.id;
        let kind = op.kind;
        let path = op.path_string();

        if self.is_enabled(&op, LogDirection::Up) {
            debug!(%id, %kind, %path, input = ?op.input, ">> {} {}", kind, path);
        }

        // The operation moves into the chain; keep a header-only copy for the
        // down-direction predicate.
        let summary = Operation::new(id, kind, op.path.clone());
        let started = Instant::now();
        let result = next.run(op).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if self.is_enabled(&summary, LogDirection::Down) {
            match &result {
                Ok(LinkResponse::Unary(response)) if response.envelope.is_error() => {
                    warn!(%id, %kind, %path, elapsed_ms, envelope = ?response.envelope, "<< {} {} failed", kind, path);
                }
                Ok(LinkResponse::Unary(response)) => {
                    debug!(%id, %kind, %path, elapsed_ms, status = ?response.meta.status, "<< {} {}", kind, path);
                }
                Ok(LinkResponse::Stream(_)) => {
                    debug!(%id, %kind, %path, elapsed_ms, "<< {} {} streaming", kind, path);
                }
                Err(error) if error.is_aborted() => {
                    debug!(%id, %kind, %path, elapsed_ms, "<< {} {} aborted", kind, path);
                }
                Err(error) => {
                    warn!(%id, %kind, %path, elapsed_ms, %error, "<< {} {} failed", kind, path);
                }
            }
        }

        result
    }
}

/// Predicate that logs everything except subscription traffic.
pub fn skip_subscriptions(op: &Operation, _direction: LogDirection) -> bool {
    op.kind != OperationType::Subscription
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkChain, OperationResponse};
    use rpclink_core::{Envelope, OperationId};
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixed;

    #[async_trait]
    impl Link for Fixed {
        async fn call(&self, _op: Operation, _next: Next<'_>) -> Result<LinkResponse, ClientError> {
            Ok(LinkResponse::Unary(OperationResponse::new(Envelope::data(json!("ok")))))
        }
    }

    #[tokio::test]
    async fn test_logger_forwards_unchanged() {
        let links: Vec<Arc<dyn Link>> = vec![Arc::new(LoggerLink::new()), Arc::new(Fixed)];
        let chain = LinkChain::new(links).unwrap();

        let op = Operation::new(OperationId::new(1), OperationType::Query, vec!["hello".into()]);
        let LinkResponse::Unary(response) = chain.execute(op).await.unwrap() else {
            panic!("expected a unary response");
        };
        assert_eq!(response.envelope, Envelope::data(json!("ok")));
    }

    #[tokio::test]
    async fn test_predicate_sees_both_directions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let logger = LoggerLink::new().enabled(move |op, direction| {
            recorder.lock().unwrap().push((op.path_string(), direction));
            true
        });
        let links: Vec<Arc<dyn Link>> = vec![Arc::new(logger), Arc::new(Fixed)];
        let chain = LinkChain::new(links).unwrap();

        let op = Operation::new(
            OperationId::new(2),
            OperationType::Mutation,
            vec!["posts".into(), "create".into()],
        );
        chain.execute(op).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("posts.create".to_string(), LogDirection::Up),
                ("posts.create".to_string(), LogDirection::Down),
            ]
        );
    }

    #[test]
    fn test_skip_subscriptions() {
        let sub = Operation::new(OperationId::new(1), OperationType::Subscription, vec![]);
        let query = Operation::new(OperationId::new(2), OperationType::Query, vec![]);
        assert!(!skip_subscriptions(&sub, LogDirection::Up));
        assert!(skip_subscriptions(&query, LogDirection::Down));
    }
}
