use crate::client::{Client, DataStream, RequestOptions};
use crate::contract::{Procedure, ProcedureKind};
use futures::stream::{BoxStream, StreamExt};
use rpclink_core::{join_path, split_path, ClientError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Outcome of [`PathProxy::invoke`].
pub enum Invocation {
    Value(Value),
    Stream(DataStream),
}

impl Invocation {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Invocation::Value(value) => Some(value),
            Invocation::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<DataStream> {
        match self {
            Invocation::Value(_) => None,
            Invocation::Stream(stream) => Some(stream),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Invocation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A position in the procedure tree.
///
/// Every `at` appends segments; the terminal method picks the operation type
/// and never becomes part of the path. Nothing is cached between traversals.
#[derive(Clone)]
pub struct PathProxy<'a> {
    client: &'a Client,
    segments: Vec<String>,
}

impl<'a> PathProxy<'a> {
    pub(crate) fn root(client: &'a Client) -> Self {
        PathProxy {
            client,
            segments: Vec::new(),
        }
    }

    /// Descend into `segment`; dotted segments descend several levels.
    pub fn at(&self, segment: &str) -> PathProxy<'a> {
        let mut segments = self.segments.clone();
        segments.extend(split_path(segment));
        PathProxy {
            client: self.client,
            segments,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn path(&self) -> String {
        join_path(&self.segments)
    }

    pub async fn query(&self, input: Option<Value>) -> Result<Value, ClientError> {
        self.query_with(input, RequestOptions::default()).await
    }

    pub async fn query_with(
        &self,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let path = self.resolve(ProcedureKind::Query)?;
        self.client.untyped().query(&path, input, options).await
    }

    pub async fn mutate(&self, input: Option<Value>) -> Result<Value, ClientError> {
        self.mutate_with(input, RequestOptions::default()).await
    }

    pub async fn mutate_with(
        &self,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let path = self.resolve(ProcedureKind::Mutation)?;
        self.client.untyped().mutation(&path, input, options).await
    }

    pub async fn subscribe(&self, input: Option<Value>) -> Result<DataStream, ClientError> {
        self.subscribe_with(input, RequestOptions::default()).await
    }

    pub async fn subscribe_with(
        &self,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<DataStream, ClientError> {
        let path = self.resolve(ProcedureKind::Subscription)?;
        self.client.untyped().subscription(&path, input, options).await
    }

    /// Call the terminal method by name: `query`, `mutate` or `subscribe`.
    pub async fn invoke(
        &self,
        method: &str,
        input: Option<Value>,
        options: RequestOptions,
    ) -> Result<Invocation, ClientError> {
        let kind = ProcedureKind::from_method(method).ok_or_else(|| {
            ClientError::unsupported(format!(
                "Unknown method `{}` on `{}`; expected `query`, `mutate` or `subscribe`",
                method,
                self.path()
            ))
        })?;

        match kind {
            ProcedureKind::Query => self.query_with(input, options).await.map(Invocation::Value),
            ProcedureKind::Mutation => self.mutate_with(input, options).await.map(Invocation::Value),
            ProcedureKind::Subscription => self
                .subscribe_with(input, options)
                .await
                .map(Invocation::Stream),
        }
    }

    fn resolve(&self, kind: ProcedureKind) -> Result<String, ClientError> {
        if self.segments.is_empty() {
            return Err(ClientError::UnknownProcedure(String::new()));
        }
        let path = self.path();
        self.client.check(&path, kind)?;
        Ok(path)
    }
}

impl fmt::Debug for PathProxy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathProxy")
            .field("path", &self.path())
            .finish()
    }
}

/// Typed calls to one [`Procedure`].
pub struct TypedProcedure<'a, I, O> {
    client: &'a Client,
    procedure: Procedure<I, O>,
}

impl<'a, I, O> TypedProcedure<'a, I, O> {
    pub(crate) fn new(client: &'a Client, procedure: Procedure<I, O>) -> Self {
        TypedProcedure { client, procedure }
    }

    pub fn procedure(&self) -> &Procedure<I, O> {
        &self.procedure
    }
}

impl<I, O> TypedProcedure<'_, I, O>
where
    I: Serialize,
    O: DeserializeOwned,
{
    pub async fn query(&self, input: &I) -> Result<O, ClientError> {
        self.query_with(input, RequestOptions::default()).await
    }

    pub async fn query_with(&self, input: &I, options: RequestOptions) -> Result<O, ClientError> {
        let (path, input) = self.prepare(ProcedureKind::Query, input)?;
        let data = self.client.untyped().query(&path, input, options).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn mutate(&self, input: &I) -> Result<O, ClientError> {
        self.mutate_with(input, RequestOptions::default()).await
    }

    pub async fn mutate_with(&self, input: &I, options: RequestOptions) -> Result<O, ClientError> {
        let (path, input) = self.prepare(ProcedureKind::Mutation, input)?;
        let data = self.client.untyped().mutation(&path, input, options).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn subscribe(&self, input: &I) -> Result<BoxStream<'static, Result<O, ClientError>>, ClientError>
    where
        O: Send + 'static,
    {
        self.subscribe_with(input, RequestOptions::default()).await
    }

    pub async fn subscribe_with(
        &self,
        input: &I,
        options: RequestOptions,
    ) -> Result<BoxStream<'static, Result<O, ClientError>>, ClientError>
    where
        O: Send + 'static,
    {
        let (path, input) = self.prepare(ProcedureKind::Subscription, input)?;
        let items = self
            .client
            .untyped()
            .subscription(&path, input, options)
            .await?;
        Ok(items
            .map(|item| item.and_then(|data| Ok(serde_json::from_value(data)?)))
            .boxed())
    }

    fn prepare(&self, kind: ProcedureKind, input: &I) -> Result<(String, Option<Value>), ClientError> {
        if self.procedure.kind() != kind {
            return Err(ClientError::unsupported(format!(
                "`{}` is a {}; call `{}` instead of `{}`",
                self.procedure.path(),
                self.procedure.kind(),
                self.procedure.kind().method(),
                kind.method()
            )));
        }
        let path = join_path(&self.procedure.segments());
        self.client.check(&path, kind)?;
        Ok((path, encode_input(input)?))
    }
}

impl<I, O> fmt::Debug for TypedProcedure<'_, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedProcedure")
            .field("procedure", &self.procedure)
            .finish()
    }
}

/// `()` and other inputs that serialize to `null` are sent as "no input".
fn encode_input<I: Serialize>(input: &I) -> Result<Option<Value>, ClientError> {
    match serde_json::to_value(input)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
