use crate::key::{QueryKey, QueryType};
use crate::query_options::{Decode, QueryFn, QueryFnContext, QueryOverrides};
use futures::future::{BoxFuture, FutureExt};
use rpclink_client::UntypedClient;
use rpclink_core::ClientError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Derives the next (or previous) cursor from the last page and all pages.
pub type PageParamFn<T> = Arc<dyn Fn(&T, &[T]) -> Option<Value> + Send + Sync>;

pub struct InfiniteOverrides<T> {
    pub query: QueryOverrides,
    pub initial_cursor: Option<Value>,
    pub get_next_page_param: Option<PageParamFn<T>>,
    pub get_previous_page_param: Option<PageParamFn<T>>,
}

impl<T> InfiniteOverrides<T> {
    pub fn new() -> Self {
        InfiniteOverrides {
            query: QueryOverrides::default(),
            initial_cursor: None,
            get_next_page_param: None,
            get_previous_page_param: None,
        }
    }

    pub fn query(mut self, query: QueryOverrides) -> Self {
        self.query = query;
        self
    }

    pub fn initial_cursor(mut self, cursor: Value) -> Self {
        self.initial_cursor = Some(cursor);
        self
    }

    pub fn next_page<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &[T]) -> Option<Value> + Send + Sync + 'static,
    {
        self.get_next_page_param = Some(Arc::new(f));
        self
    }

    pub fn previous_page<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &[T]) -> Option<Value> + Send + Sync + 'static,
    {
        self.get_previous_page_param = Some(Arc::new(f));
        self
    }
}

impl<T> Default for InfiniteOverrides<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InfiniteOverrides<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteOverrides")
            .field("query", &self.query)
            .field("initial_cursor", &self.initial_cursor)
            .finish_non_exhaustive()
    }
}

pub struct InfiniteQueryOptions<T> {
    pub query_key: QueryKey,
    pub query_fn: QueryFn<T>,
    pub initial_page_param: Option<Value>,
    pub get_next_page_param: Option<PageParamFn<T>>,
    pub get_previous_page_param: Option<PageParamFn<T>>,
    pub meta: Option<Value>,
    pub enabled: bool,
    pub path: String,
}

impl<T> InfiniteQueryOptions<T> {
    /// Fetch one page. Without a page param in `ctx` the initial cursor is used.
    pub fn fetch(&self, mut ctx: QueryFnContext) -> Option<BoxFuture<'static, Result<T, ClientError>>> {
        if ctx.page_param.is_none() {
            ctx.page_param = self.initial_page_param.clone();
        }
        if ctx.meta.is_none() {
            ctx.meta = self.meta.clone();
        }
        self.query_fn.fetch(ctx)
    }

    pub fn next_page_param(&self, last: &T, pages: &[T]) -> Option<Value> {
        self.get_next_page_param
            .as_ref()
            .and_then(|f| f(last, pages))
    }

    pub fn previous_page_param(&self, first: &T, pages: &[T]) -> Option<Value> {
        self.get_previous_page_param
            .as_ref()
            .and_then(|f| f(first, pages))
    }
}

impl<T> fmt::Debug for InfiniteQueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQueryOptions")
            .field("query_key", &self.query_key)
            .field("query_fn", &self.query_fn)
            .field("initial_page_param", &self.initial_page_param)
            .field("meta", &self.meta)
            .field("enabled", &self.enabled)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Page input: the caller's input (non-objects count as `{}`) with `cursor`
/// set to the page param.
pub fn page_input(input: Option<&Value>, page_param: Option<Value>) -> Value {
    let mut fields = match input {
        Some(Value::Object(fields)) => fields.clone(),
        _ => Map::new(),
    };
    if let Some(cursor) = page_param {
        fields.insert("cursor".to_string(), cursor);
    }
    Value::Object(fields)
}

pub(crate) fn build<T: Send + 'static>(
    client: &UntypedClient,
    path: &[String],
    input: Option<Value>,
    skip: bool,
    overrides: InfiniteOverrides<T>,
    decode: Decode<T>,
) -> InfiniteQueryOptions<T> {
    let InfiniteOverrides {
        query,
        initial_cursor,
        get_next_page_param,
        get_previous_page_param,
    } = overrides;

    let query_key = QueryKey::new(path, input.clone(), QueryType::Infinite);
    let dotted = rpclink_core::join_path(path);
    let enabled = query.enabled.unwrap_or(true);
    let meta = query.meta.clone();

    let query_fn = if skip {
        QueryFn::Skip
    } else {
        let client = client.clone();
        let dotted = dotted.clone();
        QueryFn::Fetch(Arc::new(move |ctx: QueryFnContext| {
            let client = client.clone();
            let path = dotted.clone();
            let input = page_input(input.as_ref(), ctx.page_param.clone());
            let options = query.request_options(&ctx.signal);
            let decode = decode.clone();
            async move {
                trace!("Fetching page of {}: {}", path, input);
                let data = client.query(&path, Some(input), options).await?;
                decode(data)
            }
            .boxed()
        }))
    };

    InfiniteQueryOptions {
        query_key,
        query_fn,
        initial_page_param: initial_cursor,
        get_next_page_param,
        get_previous_page_param,
        meta,
        enabled,
        path: dotted,
    }
}
