use crate::key::{QueryFilter, QueryKey};
use async_trait::async_trait;
use rpclink_core::ClientError;
use serde_json::Value;

/// The reactive query cache these options are built for.
///
/// The cache owns storage, staleness and refetching; this crate only derives
/// keys and fetch functions and asks it to invalidate.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Mark every query selected by `filter` stale and refetch the active ones.
    async fn invalidate_queries(&self, filter: QueryFilter) -> Result<(), ClientError>;

    /// Cancel in-flight fetches for the selected queries.
    async fn cancel_queries(&self, filter: QueryFilter) -> Result<(), ClientError>;

    fn get_query_data(&self, key: &QueryKey) -> Option<Value>;

    fn set_query_data(&self, key: &QueryKey, data: Value);
}
