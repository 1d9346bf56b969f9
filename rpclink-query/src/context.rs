use crate::mutation::MutationOverrides;
use crate::proxy::OptionsProxy;
use crate::query_client::QueryClient;
use rpclink_client::UntypedClient;
use rpclink_core::ClientError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// The collaborators an [`OptionsProxy`] needs.
#[derive(Clone, Debug)]
pub struct RpcContext {
    proxy: OptionsProxy,
}

impl RpcContext {
    pub fn builder() -> RpcContextBuilder {
        RpcContextBuilder::default()
    }

    pub fn proxy(&self) -> &OptionsProxy {
        &self.proxy
    }

    pub fn client(&self) -> &UntypedClient {
        self.proxy.client()
    }

    pub fn query_client(&self) -> &Arc<dyn QueryClient> {
        self.proxy.query_client()
    }
}

#[derive(Default)]
pub struct RpcContextBuilder {
    client: Option<UntypedClient>,
    query_client: Option<Arc<dyn QueryClient>>,
    overrides: MutationOverrides,
}

impl RpcContextBuilder {
    pub fn client(mut self, client: UntypedClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn query_client(mut self, query_client: Arc<dyn QueryClient>) -> Self {
        self.query_client = Some(query_client);
        self
    }

    pub fn overrides(mut self, overrides: MutationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn build(self) -> Result<RpcContext, ClientError> {
        let client = self
            .client
            .ok_or_else(|| ClientError::configuration("RpcContext requires a client"))?;
        let query_client = self
            .query_client
            .ok_or_else(|| ClientError::configuration("RpcContext requires a query client"))?;
        Ok(RpcContext {
            proxy: OptionsProxy::new(client, query_client, self.overrides),
        })
    }
}

impl fmt::Debug for RpcContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcContextBuilder")
            .field("client", &self.client.is_some())
            .field("query_client", &self.query_client.is_some())
            .field("overrides", &self.overrides)
            .finish()
    }
}

/// Initialise once, then hand out the proxy.
#[derive(Debug, Default)]
pub struct RpcService {
    context: RwLock<Option<RpcContext>>,
}

impl RpcService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `context`, replacing any earlier one.
    pub async fn init(&self, context: RpcContext) {
        let mut current = self.context.write().await;
        if current.is_some() {
            debug!("Replacing RpcService context");
        }
        *current = Some(context);
    }

    pub async fn is_initialized(&self) -> bool {
        self.context.read().await.is_some()
    }

    pub async fn proxy(&self) -> Result<OptionsProxy, ClientError> {
        self.context
            .read()
            .await
            .as_ref()
            .map(|context| context.proxy().clone())
            .ok_or_else(|| {
                ClientError::configuration("RpcService is not initialized; call init() first")
            })
    }
}
