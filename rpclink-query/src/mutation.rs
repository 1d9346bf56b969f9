use crate::key::MutationKey;
use crate::query_client::QueryClient;
use futures::future::{self, BoxFuture, FutureExt};
use rpclink_client::{RequestOptions, UntypedClient};
use rpclink_core::{CancellationToken, ClientError};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

pub type MutationFn<I, O> =
    Arc<dyn Fn(&I) -> BoxFuture<'static, Result<O, ClientError>> + Send + Sync>;
pub type OnSuccess<I, O> = Arc<dyn Fn(&O, &I) + Send + Sync>;
pub type OnError<I> = Arc<dyn Fn(&ClientError, &I) + Send + Sync>;
/// Composed success handler: caller callback, then proxy-level hook.
pub type SuccessFn<I, O> = Arc<dyn Fn(&O, &I) -> BoxFuture<'static, ()> + Send + Sync>;
pub type SuccessHook = Arc<dyn Fn(MutationSuccessContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handed to the proxy-level success hook after every successful mutation.
#[derive(Clone)]
pub struct MutationSuccessContext {
    pub path: String,
    pub meta: Option<Value>,
    pub query_client: Arc<dyn QueryClient>,
}

impl fmt::Debug for MutationSuccessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationSuccessContext")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Proxy-wide mutation behaviour, typically invalidating queries.
#[derive(Clone, Default)]
pub struct MutationOverrides {
    pub on_success: Option<SuccessHook>,
}

impl MutationOverrides {
    pub fn on_success<F, Fut>(f: F) -> Self
    where
        F: Fn(MutationSuccessContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        MutationOverrides {
            on_success: Some(Arc::new(move |ctx| f(ctx).boxed())),
        }
    }
}

impl fmt::Debug for MutationOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOverrides")
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

/// Caller settings for a mutation.
pub struct MutationOptionsIn<I, O> {
    pub on_success: Option<OnSuccess<I, O>>,
    pub on_error: Option<OnError<I>>,
    pub meta: Option<Value>,
    pub context: Map<String, Value>,
    pub signal: Option<CancellationToken>,
}

impl<I, O> MutationOptionsIn<I, O> {
    pub fn new() -> Self {
        MutationOptionsIn {
            on_success: None,
            on_error: None,
            meta: None,
            context: Map::new(),
            signal: None,
        }
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&O, &I) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ClientError, &I) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
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

impl<I, O> Default for MutationOptionsIn<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> fmt::Debug for MutationOptionsIn<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptionsIn")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

pub struct MutationOptions<I, O> {
    pub mutation_key: MutationKey,
    pub mutation_fn: MutationFn<I, O>,
    pub on_success: Option<SuccessFn<I, O>>,
    pub on_error: Option<OnError<I>>,
    pub meta: Option<Value>,
    pub path: String,
}

impl<I, O> MutationOptions<I, O> {
    /// Run the mutation the way the cache would: call `mutation_fn`, then the
    /// success or error handler.
    pub async fn execute(&self, input: I) -> Result<O, ClientError> {
        let result = (self.mutation_fn)(&input).await;
        match &result {
            Ok(data) => {
                if let Some(on_success) = &self.on_success {
                    on_success(data, &input).await;
                }
            }
            Err(error) => {
                debug!("Mutation {} failed: {}", self.path, error);
                if let Some(on_error) = &self.on_error {
                    on_error(error, &input);
                }
            }
        }
        result
    }
}

impl<I, O> Clone for MutationOptions<I, O> {
    fn clone(&self) -> Self {
        MutationOptions {
            mutation_key: self.mutation_key.clone(),
            mutation_fn: Arc::clone(&self.mutation_fn),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            meta: self.meta.clone(),
            path: self.path.clone(),
        }
    }
}

impl<I, O> fmt::Debug for MutationOptions<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("mutation_key", &self.mutation_key)
            .field("meta", &self.meta)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// The caller's `on_success` runs first; the proxy hook runs after it and
/// never replaces it.
fn compose_success<I, O>(
    caller: Option<OnSuccess<I, O>>,
    hook: Option<SuccessHook>,
    path: String,
    meta: Option<Value>,
    query_client: Arc<dyn QueryClient>,
) -> Option<SuccessFn<I, O>>
where
    I: 'static,
    O: 'static,
{
    if caller.is_none() && hook.is_none() {
        return None;
    }
    Some(Arc::new(move |data: &O, input: &I| {
        if let Some(caller) = &caller {
            caller(data, input);
        }
        match &hook {
            Some(hook) => hook(MutationSuccessContext {
                path: path.clone(),
                meta: meta.clone(),
                query_client: Arc::clone(&query_client),
            }),
            None => future::ready(()).boxed(),
        }
    }))
}

pub(crate) type Encode<I> = Arc<dyn Fn(&I) -> Result<Option<Value>, ClientError> + Send + Sync>;

pub(crate) fn build<I, O>(
    client: &UntypedClient,
    query_client: Arc<dyn QueryClient>,
    path: &[String],
    options: MutationOptionsIn<I, O>,
    overrides: &MutationOverrides,
    encode: Encode<I>,
    decode: crate::query_options::Decode<O>,
) -> MutationOptions<I, O>
where
    I: 'static,
    O: Send + 'static,
{
    let dotted = rpclink_core::join_path(path);
    let request = RequestOptions {
        context: options.context,
        signal: options.signal,
    };

    let mutation_fn: MutationFn<I, O> = {
        let client = client.clone();
        let dotted = dotted.clone();
        Arc::new(move |input: &I| {
            let client = client.clone();
            let path = dotted.clone();
            let request = request.clone();
            let decode = decode.clone();
            let input = encode(input);
            async move {
                let data = client.mutation(&path, input?, request).await?;
                decode(data)
            }
            .boxed()
        })
    };

    MutationOptions {
        mutation_key: MutationKey::new(path),
        mutation_fn,
        on_success: compose_success(
            options.on_success,
            overrides.on_success.clone(),
            dotted.clone(),
            options.meta.clone(),
            query_client,
        ),
        on_error: options.on_error,
        meta: options.meta,
        path: dotted,
    }
}
