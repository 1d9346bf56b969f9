use crate::ids::OperationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// The three kinds of procedure a server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One RPC call travelling down a link chain.
///
/// An operation is built once per call and is not mutated after it has been
/// handed to the first link. `input` is `None` when the caller passed no input
/// at all, which is distinct from an explicit JSON `null`.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationType,
    pub path: Vec<String>,
    pub input: Option<Value>,
    pub context: Map<String, Value>,
    pub signal: Option<CancellationToken>,
}

impl Operation {
    pub fn new(id: OperationId, kind: OperationType, path: Vec<String>) -> Self {
        Operation {
            id,
            kind,
            path,
            input: None,
            context: Map::new(),
            signal: None,
        }
    }

    pub fn with_input(mut self, input: Option<Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_signal(mut self, signal: Option<CancellationToken>) -> Self {
        self.signal = signal;
        self
    }

    /// Dotted procedure path, e.g. `posts.byId`.
    pub fn path_string(&self) -> String {
        join_path(&self.path)
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// Split a dotted path into segments, dropping empty pieces.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}
