//! Declared server contracts.
//!
//! A [`Contract`] is the client's copy of the server's route table: which
//! dotted paths exist and whether each is a query, a mutation or a
//! subscription. [`Procedure`] adds the input and output types on top so calls
//! can be checked by the compiler.

use indexmap::IndexMap;
use rpclink_core::{join_path, split_path, OperationType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    Query,
    Mutation,
    Subscription,
}

impl ProcedureKind {
    pub fn operation_type(&self) -> OperationType {
        match self {
            ProcedureKind::Query => OperationType::Query,
            ProcedureKind::Mutation => OperationType::Mutation,
            ProcedureKind::Subscription => OperationType::Subscription,
        }
    }

    /// Name of the proxy method that invokes this kind of procedure.
    pub fn method(&self) -> &'static str {
        match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutate",
            ProcedureKind::Subscription => "subscribe",
        }
    }

    /// Parse a proxy method name (`query`, `mutate`, `subscribe`).
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "query" => Some(ProcedureKind::Query),
            "mutate" => Some(ProcedureKind::Mutation),
            "subscribe" => Some(ProcedureKind::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation_type().as_str())
    }
}

impl From<ProcedureKind> for OperationType {
    fn from(kind: ProcedureKind) -> Self {
        kind.operation_type()
    }
}

/// A typed procedure descriptor.
///
/// `I` is serialized as the operation input and `O` is deserialized from the
/// result data. Descriptors are `const`-constructible so they can live in
/// statics generated by [`procedures!`](crate::procedures).
pub struct Procedure<I, O> {
    path: &'static str,
    kind: ProcedureKind,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> Procedure<I, O> {
    pub const fn query(path: &'static str) -> Self {
        Self::new(path, ProcedureKind::Query)
    }

    pub const fn mutation(path: &'static str) -> Self {
        Self::new(path, ProcedureKind::Mutation)
    }

    pub const fn subscription(path: &'static str) -> Self {
        Self::new(path, ProcedureKind::Subscription)
    }

    const fn new(path: &'static str, kind: ProcedureKind) -> Self {
        Procedure {
            path,
            kind,
            _types: PhantomData,
        }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn segments(&self) -> Vec<String> {
        split_path(self.path)
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }
}

impl<I, O> Clone for Procedure<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for Procedure<I, O> {}

impl<I, O> fmt::Debug for Procedure<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Route table of a server: dotted path to procedure kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contract {
    procedures: IndexMap<String, ProcedureKind>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(self, path: &str) -> Self {
        self.with(path, ProcedureKind::Query)
    }

    pub fn mutation(self, path: &str) -> Self {
        self.with(path, ProcedureKind::Mutation)
    }

    pub fn subscription(self, path: &str) -> Self {
        self.with(path, ProcedureKind::Subscription)
    }

    /// Register a typed descriptor.
    pub fn procedure<I, O>(self, procedure: &Procedure<I, O>) -> Self {
        self.with(procedure.path(), procedure.kind())
    }

    pub fn with(mut self, path: &str, kind: ProcedureKind) -> Self {
        self.insert(path, kind);
        self
    }

    /// Register a procedure; a later registration for the same path wins.
    pub fn insert(&mut self, path: &str, kind: ProcedureKind) {
        self.procedures.insert(normalize(path), kind);
    }

    /// Mount every procedure of `other` under `prefix`, the way nested routers
    /// are merged on the server. An empty prefix merges at the root.
    pub fn merge(mut self, prefix: &str, other: Contract) -> Self {
        let prefix = split_path(prefix);
        for (path, kind) in other.procedures {
            let mut full = prefix.clone();
            full.extend(split_path(&path));
            self.procedures.insert(join_path(&full), kind);
        }
        self
    }

    pub fn get(&self, path: &str) -> Option<ProcedureKind> {
        self.procedures.get(&normalize(path)).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Whether `path` names a procedure or a router namespace above one.
    pub fn has_prefix(&self, path: &str) -> bool {
        let segments = split_path(path);
        self.procedures
            .keys()
            .any(|key| split_path(key).starts_with(&segments))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ProcedureKind)> {
        self.procedures
            .iter()
            .map(|(path, kind)| (path.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

fn normalize(path: &str) -> String {
    join_path(&split_path(path))
}
