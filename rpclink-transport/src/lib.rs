pub mod headers;
pub mod http;
pub mod http_batch;
pub mod http_link;
pub mod link;
pub mod logger;
pub mod split;

pub use headers::{merge_headers, HeaderFn, HeaderSource};
pub use http::{Headers, HttpClient, HttpClientConfig, HttpFailure, HttpResponse, ReqwestHttpClient};
pub use http_batch::{BatchBuilder, BatchOperation, BatchResults, PendingResult};
pub use http_link::{HttpLink, HttpLinkConfig};
pub use link::{EnvelopeStream, Link, LinkChain, LinkResponse, Next, OperationResponse, ResponseMeta};
pub use logger::{skip_subscriptions, LogDirection, LogPredicate, LoggerLink};
pub use split::{SplitCondition, SplitLink};
