use crate::link::{Link, LinkChain, LinkResponse, Next};
use async_trait::async_trait;
use rpclink_core::{ClientError, Operation, OperationType};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub type SplitCondition = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

/// Routes each operation to one of two sub-chains.
///
/// A split terminates the outer chain: whichever branch is taken must end in
/// a terminating link of its own.
#[derive(Clone)]
pub struct SplitLink {
    condition: SplitCondition,
    yes: LinkChain,
    no: LinkChain,
}

impl SplitLink {
    pub fn new<F>(condition: F, yes: LinkChain, no: LinkChain) -> Self
    where
        F: Fn(&Operation) -> bool + Send + Sync + 'static,
    {
        SplitLink {
            condition: Arc::new(condition),
            yes,
            no,
        }
    }

    /// Subscriptions go to `subscriptions`, everything else to `requests`.
    pub fn by_subscription(subscriptions: LinkChain, requests: LinkChain) -> Self {
        Self::new(
            |op| op.kind == OperationType::Subscription,
            subscriptions,
            requests,
        )
    }
}

impl fmt::Debug for SplitLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitLink")
            .field("yes", &self.yes)
            .field("no", &self.no)
            .finish()
    }
}

#[async_trait]
impl Link for SplitLink {
    async fn call(&self, op: Operation, _next: Next<'_>) -> Result<LinkResponse, ClientError> {
        let branch = (self.condition)(&op);
        trace!(id = %op.id, branch, "Split routing {}", op.path_string());
        if branch {
            self.yes.execute(op).await
        } else {
            self.no.execute(op).await
        }
    }
}
