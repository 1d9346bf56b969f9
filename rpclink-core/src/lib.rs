//! Data model shared by the rpclink crates: operations, response envelopes
//! and the client error taxonomy.

pub mod envelope;
pub mod error;
pub mod ids;
pub mod operation;

pub use envelope::{Envelope, ErrorCode, ErrorShape, ResultData};
pub use error::{ClientError, Result, TransportError};
pub use ids::{OperationId, OperationIdAllocator};
pub use operation::{join_path, split_path, Operation, OperationType};

// Re-exported so downstream crates agree on one cancellation type.
pub use tokio_util::sync::CancellationToken;
