//! Subscription lifecycle.
//!
//! `idle -> pending -> connecting -> success | error`, driven by a tokio task
//! that publishes every transition on a `watch` channel. Dropping the
//! [`Subscription`] or calling [`Subscription::unsubscribe`] cancels the task
//! and the state returns to `idle`. A stream that ends on its own keeps its
//! last `success` data.

use crate::key::QueryKey;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use rpclink_client::RequestOptions;
use rpclink_core::{CancellationToken, ClientError};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type ItemStream<T> = BoxStream<'static, Result<T, ClientError>>;
pub type SubscribeFn<T> = Arc<
    dyn Fn(RequestOptions) -> BoxFuture<'static, Result<ItemStream<T>, ClientError>> + Send + Sync,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Idle,
    Pending,
    Connecting,
    Error,
    Success,
}

/// Cancelling resets to `Idle`. Normal stream completion leaves the last
/// `Success` in place and only falls back to `Idle` when no item arrived.
#[derive(Debug, Clone)]
pub enum SubscriptionState<T> {
    Idle,
    Pending,
    Connecting,
    /// Latest item received
    Success { data: T },
    Error { error: Arc<ClientError> },
}

impl<T> SubscriptionState<T> {
    pub fn status(&self) -> SubscriptionStatus {
        match self {
            SubscriptionState::Idle => SubscriptionStatus::Idle,
            SubscriptionState::Pending => SubscriptionStatus::Pending,
            SubscriptionState::Connecting => SubscriptionStatus::Connecting,
            SubscriptionState::Success { .. } => SubscriptionStatus::Success,
            SubscriptionState::Error { .. } => SubscriptionStatus::Error,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            SubscriptionState::Success { data } => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            SubscriptionState::Error { error } => Some(error),
            _ => None,
        }
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Caller settings for a subscription.
pub struct SubscriptionOptionsIn<T> {
    pub enabled: bool,
    pub on_started: Option<Callback>,
    pub on_data: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&ClientError) + Send + Sync>>,
    pub on_stopped: Option<Callback>,
    pub context: Map<String, Value>,
}

impl<T> SubscriptionOptionsIn<T> {
    pub fn new() -> Self {
        SubscriptionOptionsIn {
            enabled: true,
            on_started: None,
            on_data: None,
            on_error: None,
            on_stopped: None,
            context: Map::new(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn on_started(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_started = Some(Arc::new(f));
        self
    }

    pub fn on_data(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_stopped(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stopped = Some(Arc::new(f));
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

impl<T> Default for SubscriptionOptionsIn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscriptionOptionsIn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionOptionsIn")
            .field("enabled", &self.enabled)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

pub struct SubscriptionOptions<T> {
    pub query_key: QueryKey,
    pub path: String,
    pub options: SubscriptionOptionsIn<T>,
    pub subscribe: SubscribeFn<T>,
}

impl<T> fmt::Debug for SubscriptionOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("query_key", &self.query_key)
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A running (or idle) subscription.
pub struct Subscription<T> {
    state: watch::Receiver<SubscriptionState<T>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    path: String,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    /// Start the lifecycle. With `enabled: false` the subscription stays idle
    /// and nothing is called. Must run inside a tokio runtime.
    pub fn start(options: SubscriptionOptions<T>) -> Self {
        let SubscriptionOptions {
            path,
            options,
            subscribe,
            ..
        } = options;
        let cancel = CancellationToken::new();

        if !options.enabled {
            let (_tx, state) = watch::channel(SubscriptionState::Idle);
            debug!("Subscription {} disabled", path);
            return Subscription {
                state,
                cancel,
                task: None,
                path,
            };
        }

        let (tx, state) = watch::channel(SubscriptionState::Pending);
        let task = tokio::spawn(run(
            path.clone(),
            options,
            subscribe,
            tx,
            cancel.clone(),
        ));

        Subscription {
            state,
            cancel,
            task: Some(task),
            path,
        }
    }
}

impl<T> Subscription<T> {
    pub fn status(&self) -> SubscriptionStatus {
        self.state.borrow().status()
    }

    pub fn state(&self) -> SubscriptionState<T>
    where
        T: Clone,
    {
        self.state.borrow().clone()
    }

    /// A receiver that observes every transition.
    pub fn watch(&self) -> watch::Receiver<SubscriptionState<T>> {
        self.state.clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop the stream and wait until the state is back to `idle`.
    pub async fn unsubscribe(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Subscription task for {} ended abnormally: {}", self.path, e);
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("status", &self.status())
            .finish()
    }
}

async fn run<T: Send + Sync + 'static>(
    path: String,
    options: SubscriptionOptionsIn<T>,
    subscribe: SubscribeFn<T>,
    tx: watch::Sender<SubscriptionState<T>>,
    cancel: CancellationToken,
) {
    let stopped = |tx: &watch::Sender<SubscriptionState<T>>, completed: bool| {
        let has_data = matches!(*tx.borrow(), SubscriptionState::Success { .. });
        if !(completed && has_data) {
            tx.send_replace(SubscriptionState::Idle);
        }
        if let Some(on_stopped) = &options.on_stopped {
            on_stopped();
        }
    };
    let failed = |tx: &watch::Sender<SubscriptionState<T>>, error: ClientError| {
        warn!("Subscription {} failed: {}", path, error);
        if let Some(on_error) = &options.on_error {
            on_error(&error);
        }
        tx.send_replace(SubscriptionState::Error {
            error: Arc::new(error),
        });
    };

    tx.send_replace(SubscriptionState::Connecting);
    let request = RequestOptions {
        context: options.context.clone(),
        signal: Some(cancel.clone()),
    };

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            stopped(&tx, false);
            return;
        }
        connected = subscribe(request) => connected,
    };

    let mut items = match connected {
        Ok(items) => items,
        Err(error) if error.is_aborted() => {
            stopped(&tx, false);
            return;
        }
        Err(error) => {
            failed(&tx, error);
            return;
        }
    };

    debug!("Subscription {} started", path);
    if let Some(on_started) = &options.on_started {
        on_started();
    }

    let mut completed = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = items.next() => next,
        };
        match next {
            Some(Ok(data)) => {
                if let Some(on_data) = &options.on_data {
                    on_data(&data);
                }
                tx.send_replace(SubscriptionState::Success { data });
            }
            Some(Err(error)) if error.is_aborted() => break,
            Some(Err(error)) => {
                failed(&tx, error);
                return;
            }
            None => {
                completed = true;
                break;
            }
        }
    }

    debug!("Subscription {} stopped", path);
    stopped(&tx, completed);
}
