pub mod client;
pub mod contract;
pub mod logging;
pub mod macros;
pub mod proxy;

pub use client::{
    collect_stream, data_stream, unwrap_response, Client, ClientBuilder, DataStream,
    RequestOptions, UntypedClient,
};
pub use contract::{Contract, Procedure, ProcedureKind};
pub use proxy::{Invocation, PathProxy, TypedProcedure};

pub use rpclink_core::{CancellationToken, ClientError};
pub use rpclink_transport::{HttpLink, HttpLinkConfig, Link, LinkChain, LoggerLink, SplitLink};
