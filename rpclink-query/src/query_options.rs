use crate::key::{QueryKey, QueryType};
use futures::future::{BoxFuture, FutureExt};
use rpclink_client::{RequestOptions, UntypedClient};
use rpclink_core::{CancellationToken, ClientError};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub type Decode<T> = Arc<dyn Fn(Value) -> Result<T, ClientError> + Send + Sync>;
pub type FetchFn<T> =
    Arc<dyn Fn(QueryFnContext) -> BoxFuture<'static, Result<T, ClientError>> + Send + Sync>;

/// What the cache hands to a fetch.
#[derive(Debug, Clone, Default)]
pub struct QueryFnContext {
    /// Cancelled by the cache when the query is no longer wanted
    pub signal: CancellationToken,
    /// Cursor of the page being fetched; infinite queries only
    pub page_param: Option<Value>,
    pub meta: Option<Value>,
}

impl QueryFnContext {
    pub fn new(signal: CancellationToken) -> Self {
        QueryFnContext {
            signal,
            ..Default::default()
        }
    }

    pub fn page_param(mut self, page_param: Value) -> Self {
        self.page_param = Some(page_param);
        self
    }
}

/// A fetch function, or the cache's "do not fetch" sentinel.
pub enum QueryFn<T> {
    Skip,
    Fetch(FetchFn<T>),
}

impl<T> QueryFn<T> {
    pub fn is_skip(&self) -> bool {
        matches!(self, QueryFn::Skip)
    }

    /// The fetch future, or `None` for [`QueryFn::Skip`].
    pub fn fetch(&self, ctx: QueryFnContext) -> Option<BoxFuture<'static, Result<T, ClientError>>> {
        match self {
            QueryFn::Skip => None,
            QueryFn::Fetch(fetch) => Some(fetch(ctx)),
        }
    }
}

impl<T> Clone for QueryFn<T> {
    fn clone(&self) -> Self {
        match self {
            QueryFn::Skip => QueryFn::Skip,
            QueryFn::Fetch(fetch) => QueryFn::Fetch(Arc::clone(fetch)),
        }
    }
}

impl<T> fmt::Debug for QueryFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFn::Skip => f.write_str("Skip"),
            QueryFn::Fetch(_) => f.write_str("Fetch(..)"),
        }
    }
}

/// Caller settings for a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    pub meta: Option<Value>,
    pub enabled: Option<bool>,
    /// Per-call link context
    pub context: Map<String, Value>,
    /// Caller-owned signal, used when `abort_on_destroy` is off
    pub signal: Option<CancellationToken>,
    /// Wire the cache's cancellation token into the request
    pub abort_on_destroy: bool,
}

impl QueryOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
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

    pub fn abort_on_destroy(mut self, abort_on_destroy: bool) -> Self {
        self.abort_on_destroy = abort_on_destroy;
        self
    }

    /// Request options for one fetch. The cache token is only wired in when
    /// `abort_on_destroy` is set; otherwise the caller's signal, if any, stays.
    pub(crate) fn request_options(&self, cache_signal: &CancellationToken) -> RequestOptions {
        RequestOptions {
            context: self.context.clone(),
            signal: if self.abort_on_destroy {
                Some(cache_signal.clone())
            } else {
                self.signal.clone()
            },
        }
    }
}

pub struct QueryOptions<T> {
    pub query_key: QueryKey,
    pub query_fn: QueryFn<T>,
    pub meta: Option<Value>,
    pub enabled: bool,
    /// Dotted procedure path
    pub path: String,
}

impl<T> QueryOptions<T> {
    /// Run the fetch with `ctx`, filling in this query's meta. `None` when the
    /// query is skipped.
    pub fn fetch(&self, mut ctx: QueryFnContext) -> Option<BoxFuture<'static, Result<T, ClientError>>> {
        if ctx.meta.is_none() {
            ctx.meta = self.meta.clone();
        }
        self.query_fn.fetch(ctx)
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        QueryOptions {
            query_key: self.query_key.clone(),
            query_fn: self.query_fn.clone(),
            meta: self.meta.clone(),
            enabled: self.enabled,
            path: self.path.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("query_key", &self.query_key)
            .field("query_fn", &self.query_fn)
            .field("meta", &self.meta)
            .field("enabled", &self.enabled)
            .field("path", &self.path)
            .finish()
    }
}

/// Build query options for `path`. `input` is `None` for "no input" and for
/// skipped queries; `skip` selects [`QueryFn::Skip`].
///
/// Streamed results are drained into one JSON array before `decode` sees
/// them (see [`rpclink_client::collect_stream`]).
pub(crate) fn build<T: Send + 'static>(
    client: &UntypedClient,
    path: &[String],
    input: Option<Value>,
    skip: bool,
    overrides: QueryOverrides,
    decode: Decode<T>,
) -> QueryOptions<T> {
    let query_key = QueryKey::new(path, input.clone(), QueryType::Query);
    let dotted = rpclink_core::join_path(path);
    let enabled = overrides.enabled.unwrap_or(true);
    let meta = overrides.meta.clone();

    let query_fn = if skip {
        QueryFn::Skip
    } else {
        let client = client.clone();
        let dotted = dotted.clone();
        QueryFn::Fetch(Arc::new(move |ctx: QueryFnContext| {
            let client = client.clone();
            let path = dotted.clone();
            let input = input.clone();
            let options = overrides.request_options(&ctx.signal);
            let decode = decode.clone();
            async move {
                trace!("Fetching query {}", path);
                let data = client.query(&path, input, options).await?;
                decode(data)
            }
            .boxed()
        }))
    };

    QueryOptions {
        query_key,
        query_fn,
        meta,
        enabled,
        path: dotted,
    }
}
