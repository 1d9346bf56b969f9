//! Options proxy: one [`ProcedureOptions`] node per procedure path.
//!
//! Nodes are built on demand from the path; nothing is cached between
//! traversals, so two nodes for the same path always produce equal keys.

use crate::infinite::{self, InfiniteOverrides, InfiniteQueryOptions};
use crate::key::{Input, MutationKey, QueryFilter, QueryKey, QueryType};
use crate::mutation::{self, Encode, MutationOptions, MutationOptionsIn, MutationOverrides};
use crate::query_client::QueryClient;
use crate::query_options::{self, Decode, QueryOptions, QueryOverrides};
use crate::subscription::{ItemStream, SubscribeFn, SubscriptionOptions, SubscriptionOptionsIn};
use futures::future::FutureExt;
use futures::stream::StreamExt;
use rpclink_client::{Procedure, ProcedureKind, RequestOptions, UntypedClient};
use rpclink_core::{join_path, split_path, ClientError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Entry point for building cache options.
#[derive(Clone)]
pub struct OptionsProxy {
    client: UntypedClient,
    query_client: Arc<dyn QueryClient>,
    overrides: MutationOverrides,
}

impl OptionsProxy {
    pub fn new(
        client: UntypedClient,
        query_client: Arc<dyn QueryClient>,
        overrides: MutationOverrides,
    ) -> Self {
        OptionsProxy {
            client,
            query_client,
            overrides,
        }
    }

    pub fn client(&self) -> &UntypedClient {
        &self.client
    }

    pub fn query_client(&self) -> &Arc<dyn QueryClient> {
        &self.query_client
    }

    pub fn overrides(&self) -> &MutationOverrides {
        &self.overrides
    }

    /// Untyped node for `path`; dotted paths descend several levels.
    pub fn at(&self, path: &str) -> ProcedureOptions {
        ProcedureOptions::new(self.clone(), split_path(path), None)
    }

    pub fn procedure<I, O>(&self, procedure: &Procedure<I, O>) -> ProcedureOptions<I, O> {
        ProcedureOptions::new(self.clone(), procedure.segments(), Some(procedure.kind()))
    }

    /// Filter selecting every query at or below `path`.
    pub fn path_filter(&self, path: &str) -> QueryFilter {
        QueryFilter::new(QueryKey::for_path(&split_path(path)))
    }

    pub async fn invalidate(&self, filter: QueryFilter) -> Result<(), ClientError> {
        self.query_client.invalidate_queries(filter).await
    }
}

impl fmt::Debug for OptionsProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsProxy")
            .field("client", &self.client)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// Options builders for one procedure.
///
/// Untyped nodes (`I = O = Value`) come from [`OptionsProxy::at`]; typed nodes
/// from [`OptionsProxy::procedure`] also reject builders for the wrong
/// procedure kind.
pub struct ProcedureOptions<I = Value, O = Value> {
    proxy: OptionsProxy,
    segments: Vec<String>,
    kind: Option<ProcedureKind>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ProcedureOptions<I, O> {
    fn new(proxy: OptionsProxy, segments: Vec<String>, kind: Option<ProcedureKind>) -> Self {
        ProcedureOptions {
            proxy,
            segments,
            kind,
            _marker: PhantomData,
        }
    }

    /// Descend into `segment`. The child is untyped.
    pub fn at(&self, segment: &str) -> ProcedureOptions {
        let mut segments = self.segments.clone();
        segments.extend(split_path(segment));
        ProcedureOptions::new(self.proxy.clone(), segments, None)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn path(&self) -> String {
        join_path(&self.segments)
    }

    /// `[path]`, which prefix-matches every query below this node.
    pub fn path_key(&self) -> QueryKey {
        QueryKey::for_path(&self.segments)
    }

    pub fn path_filter(&self) -> QueryFilter {
        QueryFilter::new(self.path_key())
    }

    pub fn mutation_key(&self) -> MutationKey {
        MutationKey::new(&self.segments)
    }

    /// Invalidate every cached query at or below this path.
    pub async fn invalidate(&self) -> Result<(), ClientError> {
        self.proxy.invalidate(self.path_filter()).await
    }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        self.proxy.query_client.cancel_queries(self.path_filter()).await
    }

    fn expect_kind(&self, wanted: ProcedureKind) -> Result<(), ClientError> {
        if self.segments.is_empty() {
            return Err(ClientError::UnknownProcedure(String::new()));
        }
        match self.kind {
            Some(kind) if kind != wanted => Err(ClientError::unsupported(format!(
                "`{}` is a {}, not a {}",
                self.path(),
                kind,
                wanted
            ))),
            _ => Ok(()),
        }
    }
}

impl<I, O> ProcedureOptions<I, O>
where
    I: Serialize + 'static,
    O: DeserializeOwned + Send + 'static,
{
    pub fn query_key(&self, input: impl Into<Input<I>>) -> Result<QueryKey, ClientError> {
        let (input, _) = encode(&input.into())?;
        Ok(QueryKey::new(&self.segments, input, QueryType::Query))
    }

    /// Key of the infinite query; paging fields are left out.
    pub fn infinite_query_key(&self, input: impl Into<Input<I>>) -> Result<QueryKey, ClientError> {
        let (input, _) = encode(&input.into())?;
        Ok(QueryKey::new(&self.segments, input, QueryType::Infinite))
    }

    /// Cached data for `input`, if the cache holds any.
    pub fn get_query_data(&self, input: impl Into<Input<I>>) -> Result<Option<O>, ClientError> {
        let key = self.query_key(input)?;
        self.proxy
            .query_client
            .get_query_data(&key)
            .map(serde_json::from_value::<O>)
            .transpose()
            .map_err(ClientError::from)
    }

    /// Seed the cache entry for `input` with `data`.
    pub fn set_query_data(&self, input: impl Into<Input<I>>, data: &O) -> Result<(), ClientError>
    where
        O: Serialize,
    {
        let key = self.query_key(input)?;
        let data = serde_json::to_value(data)?;
        self.proxy.query_client.set_query_data(&key, data);
        Ok(())
    }

    pub fn query_options(
        &self,
        input: impl Into<Input<I>>,
        overrides: QueryOverrides,
    ) -> Result<QueryOptions<O>, ClientError> {
        self.expect_kind(ProcedureKind::Query)?;
        let (input, skip) = encode(&input.into())?;
        Ok(query_options::build(
            &self.proxy.client,
            &self.segments,
            input,
            skip,
            overrides,
            decoder(),
        ))
    }

    pub fn infinite_query_options(
        &self,
        input: impl Into<Input<I>>,
        overrides: InfiniteOverrides<O>,
    ) -> Result<InfiniteQueryOptions<O>, ClientError> {
        self.expect_kind(ProcedureKind::Query)?;
        let (input, skip) = encode(&input.into())?;
        Ok(infinite::build(
            &self.proxy.client,
            &self.segments,
            input,
            skip,
            overrides,
            decoder(),
        ))
    }

    pub fn mutation_options(
        &self,
        options: MutationOptionsIn<I, O>,
    ) -> Result<MutationOptions<I, O>, ClientError> {
        self.expect_kind(ProcedureKind::Mutation)?;
        Ok(mutation::build(
            &self.proxy.client,
            Arc::clone(&self.proxy.query_client),
            &self.segments,
            options,
            &self.proxy.overrides,
            encoder(),
            decoder(),
        ))
    }

    /// Options for [`crate::Subscription::start`]. A skipped input yields
    /// disabled options.
    pub fn subscription_options(
        &self,
        input: impl Into<Input<I>>,
        mut options: SubscriptionOptionsIn<O>,
    ) -> Result<SubscriptionOptions<O>, ClientError> {
        self.expect_kind(ProcedureKind::Subscription)?;
        let (input, skip) = encode(&input.into())?;
        if skip {
            options.enabled = false;
        }

        let path = self.path();
        let subscribe: SubscribeFn<O> = {
            let client = self.proxy.client.clone();
            let path = path.clone();
            let input = input.clone();
            Arc::new(move |request: RequestOptions| {
                let client = client.clone();
                let path = path.clone();
                let input = input.clone();
                async move {
                    let items = client.subscription(&path, input, request).await?;
                    let items: ItemStream<O> = items
                        .map(|item| item.and_then(|data| Ok(serde_json::from_value::<O>(data)?)))
                        .boxed();
                    Ok::<_, ClientError>(items)
                }
                .boxed()
            })
        };

        Ok(SubscriptionOptions {
            query_key: QueryKey::new(&self.segments, input, QueryType::Any),
            path,
            options,
            subscribe,
        })
    }
}

impl<I, O> Clone for ProcedureOptions<I, O> {
    fn clone(&self) -> Self {
        ProcedureOptions::new(self.proxy.clone(), self.segments.clone(), self.kind)
    }
}

impl<I, O> fmt::Debug for ProcedureOptions<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureOptions")
            .field("path", &self.path())
            .field("kind", &self.kind)
            .finish()
    }
}

/// `(input, skip)`. Inputs serializing to `null` count as no input.
fn encode<I: Serialize>(input: &Input<I>) -> Result<(Option<Value>, bool), ClientError> {
    match input {
        Input::Skip => Ok((None, true)),
        Input::Value(value) => Ok((encode_value(value)?, false)),
    }
}

fn encode_value<I: Serialize>(input: &I) -> Result<Option<Value>, ClientError> {
    match serde_json::to_value(input)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

fn encoder<I: Serialize + 'static>() -> Encode<I> {
    Arc::new(|input: &I| -> Result<Option<Value>, ClientError> { encode_value(input) })
}

fn decoder<O: DeserializeOwned + 'static>() -> Decode<O> {
    Arc::new(|data: Value| -> Result<O, ClientError> { Ok(serde_json::from_value(data)?) })
}
