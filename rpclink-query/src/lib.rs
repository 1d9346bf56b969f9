//! Query-cache options for rpclink procedures.
//!
//! [`OptionsProxy`] turns procedure paths into the keys, fetch functions and
//! mutation handlers a reactive query cache consumes. The cache itself is
//! behind the [`QueryClient`] trait.

pub mod context;
pub mod infinite;
pub mod key;
pub mod mutation;
pub mod proxy;
pub mod query_client;
pub mod query_options;
pub mod subscription;

pub use context::{RpcContext, RpcContextBuilder, RpcService};
pub use infinite::{page_input, InfiniteOverrides, InfiniteQueryOptions, PageParamFn};
pub use key::{partial_match, Input, MutationKey, QueryFilter, QueryKey, QueryType, SkipToken};
pub use mutation::{
    MutationFn, MutationOptions, MutationOptionsIn, MutationOverrides, MutationSuccessContext,
    OnError, OnSuccess, SuccessHook,
};
pub use proxy::{OptionsProxy, ProcedureOptions};
pub use query_client::QueryClient;
pub use query_options::{QueryFn, QueryFnContext, QueryOptions, QueryOverrides};
pub use subscription::{
    ItemStream, Subscription, SubscriptionOptions, SubscriptionOptionsIn, SubscriptionState,
    SubscriptionStatus,
};

pub use rpclink_core::{CancellationToken, ClientError};
