// Options proxy end to end: a recording link stands in for the server and a
// recording query client stands in for the cache.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rpclink_client::{Procedure, UntypedClient};
use rpclink_core::{
    CancellationToken, ClientError, Envelope, ErrorCode, ErrorShape, Operation, OperationType,
};
use rpclink_query::{
    InfiniteOverrides, MutationOptionsIn, MutationOverrides, OptionsProxy, QueryClient,
    QueryFilter, QueryFnContext, QueryKey, QueryOverrides, QueryType, RpcContext, RpcService,
    SkipToken, Subscription, SubscriptionOptionsIn, SubscriptionStatus,
};
use rpclink_transport::{
    HttpClientConfig, HttpLink, HttpLinkConfig, Link, LinkChain, LinkResponse, Next,
    OperationResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// FAKES
// ============================================================================

#[derive(Debug, Clone)]
struct Seen {
    kind: OperationType,
    path: String,
    input: Option<Value>,
    signal: Option<CancellationToken>,
}

/// Answers by path and records every operation it sees.
#[derive(Default, Clone)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Link for Recorder {
    async fn call(&self, op: Operation, _next: Next<'_>) -> Result<LinkResponse, ClientError> {
        let path = op.path_string();
        self.seen.lock().unwrap().push(Seen {
            kind: op.kind,
            path: path.clone(),
            input: op.input.clone(),
            signal: op.signal.clone(),
        });

        let unary = |envelope: Envelope| -> Result<LinkResponse, ClientError> {
            Ok(LinkResponse::Unary(OperationResponse::new(envelope)))
        };
        match path.as_str() {
            "posts.fail" => unary(Envelope::error(ErrorShape::new(
                ErrorCode::Conflict,
                "Title taken",
            ))),
            "numbers.stream" => Ok(LinkResponse::Stream(
                stream::iter(vec![
                    Ok(Envelope::data(json!(1))),
                    Ok(Envelope::data(json!(2))),
                    Ok(Envelope::data(json!(3))),
                ])
                .boxed(),
            )),
            "feed" => Ok(LinkResponse::Stream(
                stream::iter((1..=3).map(|i| Ok(Envelope::data(json!({"seq": i}))))).boxed(),
            )),
            "ticks" => Ok(LinkResponse::Stream(
                stream::iter(vec![Ok(Envelope::data(json!({"seq": 1})))])
                    .chain(stream::pending())
                    .boxed(),
            )),
            "posts.list" => unary(Envelope::data(json!([
                {"id": 1, "title": "first"},
                {"id": 2, "title": "second"}
            ]))),
            _ => unary(Envelope::data(json!({"path": path, "input": op.input}))),
        }
    }
}

#[derive(Default)]
struct RecordingCache {
    invalidated: Mutex<Vec<QueryFilter>>,
    cancelled: Mutex<Vec<QueryFilter>>,
    data: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl QueryClient for RecordingCache {
    async fn invalidate_queries(&self, filter: QueryFilter) -> Result<(), ClientError> {
        self.invalidated.lock().unwrap().push(filter);
        Ok(())
    }

    async fn cancel_queries(&self, filter: QueryFilter) -> Result<(), ClientError> {
        self.cancelled.lock().unwrap().push(filter);
        Ok(())
    }

    fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.data.lock().unwrap().get(&key.hash_key()).cloned()
    }

    fn set_query_data(&self, key: &QueryKey, data: Value) {
        self.data.lock().unwrap().insert(key.hash_key(), data);
    }
}

fn setup(overrides: MutationOverrides) -> (OptionsProxy, Recorder, Arc<RecordingCache>) {
    let recorder = Recorder::default();
    let cache = Arc::new(RecordingCache::default());
    let client = UntypedClient::new(LinkChain::single(recorder.clone()));
    let proxy = OptionsProxy::new(client, cache.clone(), overrides);
    (proxy, recorder, cache)
}

// ============================================================================
// QUERIES
// ============================================================================

#[tokio::test]
async fn test_query_options_fetch_through_chain() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let options = proxy
        .at("hello")
        .query_options(json!({"name": "World"}), QueryOverrides::new().meta(json!({"ttl": 5})))
        .unwrap();

    assert_eq!(
        serde_json::to_value(&options.query_key).unwrap(),
        json!([["hello"], {"input": {"name": "World"}, "type": "query"}])
    );
    assert_eq!(options.meta, Some(json!({"ttl": 5})));

    let data = options.fetch(QueryFnContext::default()).unwrap().await.unwrap();
    assert_eq!(data, json!({"path": "hello", "input": {"name": "World"}}));

    let seen = recorder.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, OperationType::Query);
    assert_eq!(seen[0].input, Some(json!({"name": "World"})));
}

#[tokio::test]
async fn test_skip_token_never_fetches() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let options = proxy
        .at("hello")
        .query_options(SkipToken, QueryOverrides::new())
        .unwrap();

    assert!(options.query_fn.is_skip());
    assert!(options.fetch(QueryFnContext::default()).is_none());
    assert_eq!(
        serde_json::to_value(&options.query_key).unwrap(),
        json!([["hello"], {"type": "query"}])
    );
    assert!(recorder.seen().is_empty());
}

#[tokio::test]
async fn test_streamed_query_is_collected() {
    let (proxy, _, _) = setup(MutationOverrides::default());
    let options = proxy
        .at("numbers.stream")
        .query_options(Value::Null, QueryOverrides::new())
        .unwrap();
    let data = options.fetch(QueryFnContext::default()).unwrap().await.unwrap();
    assert_eq!(data, json!([1, 2, 3]));
}

#[derive(Debug, Serialize)]
struct ListInput {
    limit: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Post {
    id: u64,
    title: String,
}

#[tokio::test]
async fn test_typed_query_options_decode() {
    const LIST: Procedure<ListInput, Vec<Post>> = Procedure::query("posts.list");
    let (proxy, _, _) = setup(MutationOverrides::default());

    let options = proxy
        .procedure(&LIST)
        .query_options(rpclink_query::Input::Value(ListInput { limit: 2 }), QueryOverrides::new())
        .unwrap();
    let posts = options.fetch(QueryFnContext::default()).unwrap().await.unwrap();
    assert_eq!(
        posts,
        vec![
            Post { id: 1, title: "first".into() },
            Post { id: 2, title: "second".into() },
        ]
    );
}

#[tokio::test]
async fn test_abort_on_destroy_wiring() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let node = proxy.at("hello");

    let cache_signal = CancellationToken::new();
    let wired = node
        .query_options(json!({}), QueryOverrides::new().abort_on_destroy(true))
        .unwrap();
    wired
        .fetch(QueryFnContext::new(cache_signal.clone()))
        .unwrap()
        .await
        .unwrap();

    let unwired = node.query_options(json!({}), QueryOverrides::new()).unwrap();
    unwired
        .fetch(QueryFnContext::new(cache_signal.clone()))
        .unwrap()
        .await
        .unwrap();

    let seen = recorder.seen();
    cache_signal.cancel();
    assert!(seen[0].signal.as_ref().unwrap().is_cancelled());
    assert!(seen[1].signal.is_none());
}

#[tokio::test]
async fn test_cancelled_cache_signal_aborts_fetch() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let options = proxy
        .at("hello")
        .query_options(json!({}), QueryOverrides::new().abort_on_destroy(true))
        .unwrap();

    let cache_signal = CancellationToken::new();
    cache_signal.cancel();
    let err = options
        .fetch(QueryFnContext::new(cache_signal))
        .unwrap()
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(recorder.seen().is_empty());
}

#[test]
fn test_query_data_uses_the_query_key() {
    let (proxy, _, cache) = setup(MutationOverrides::default());
    let node = proxy.at("posts.byId");
    node.set_query_data(json!({"id": 1}), &json!({"title": "cached"})).unwrap();

    assert_eq!(
        node.get_query_data(json!({"id": 1})).unwrap(),
        Some(json!({"title": "cached"}))
    );
    assert_eq!(node.get_query_data(json!({"id": 2})).unwrap(), None);

    let key = QueryKey::new(&["posts", "byId"], Some(json!({"id": 1})), QueryType::Query);
    assert!(cache.data.lock().unwrap().contains_key(&key.hash_key()));
}

#[test]
fn test_typed_query_data_round_trips_through_the_cache() {
    const BY_ID: Procedure<Value, Post> = Procedure::query("posts.byId");
    let (proxy, _, cache) = setup(MutationOverrides::default());
    let node = proxy.procedure(&BY_ID);

    let post = Post { id: 7, title: "seeded".into() };
    node.set_query_data(json!({"id": 7}), &post).unwrap();
    assert_eq!(node.get_query_data(json!({"id": 7})).unwrap(), Some(post));

    let key = QueryKey::new(&["posts", "byId"], Some(json!({"id": 7})), QueryType::Query);
    assert_eq!(
        cache.data.lock().unwrap().get(&key.hash_key()),
        Some(&json!({"id": 7, "title": "seeded"}))
    );
}

// ============================================================================
// INFINITE QUERIES
// ============================================================================

#[tokio::test]
async fn test_infinite_cursor_merge() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let options = proxy
        .at("posts.feed")
        .infinite_query_options(
            json!({"limit": 10, "cursor": 99}),
            InfiniteOverrides::new()
                .initial_cursor(json!(0))
                .next_page(|last: &Value, _pages| last["input"]["cursor"].as_u64().map(|c| json!(c + 10))),
        )
        .unwrap();

    assert_eq!(
        serde_json::to_value(&options.query_key).unwrap(),
        json!([["posts", "feed"], {"input": {"limit": 10}, "type": "infinite"}])
    );

    let first = options.fetch(QueryFnContext::default()).unwrap().await.unwrap();
    let next = options.next_page_param(&first, std::slice::from_ref(&first));
    assert_eq!(next, Some(json!(10)));

    options
        .fetch(QueryFnContext::default().page_param(json!(10)))
        .unwrap()
        .await
        .unwrap();

    let seen = recorder.seen();
    assert_eq!(seen[0].input, Some(json!({"limit": 10, "cursor": 0})));
    assert_eq!(seen[1].input, Some(json!({"limit": 10, "cursor": 10})));
}

#[test]
fn test_infinite_and_plain_keys_differ() {
    let (proxy, _, _) = setup(MutationOverrides::default());
    let node = proxy.at("posts.feed");
    let plain = node.query_key(json!({"limit": 10})).unwrap();
    let infinite = node.infinite_query_key(json!({"limit": 10, "cursor": 3})).unwrap();
    assert_ne!(plain, infinite);
    assert_eq!(infinite.kind(), QueryType::Infinite);
    assert!(plain.matches(&node.path_key()));
    assert!(infinite.matches(&node.path_key()));
}

// ============================================================================
// MUTATIONS
// ============================================================================

#[tokio::test]
async fn test_mutation_success_order_and_invalidation() {
    let order = Arc::new(Mutex::new(Vec::<String>::new()));
    let hook_order = order.clone();
    let overrides = MutationOverrides::on_success(move |ctx| {
        let order = hook_order.clone();
        async move {
            order.lock().unwrap().push(format!("hook:{}", ctx.path));
            let filter = QueryFilter::new(QueryKey::for_path(&["posts"]));
            ctx.query_client.invalidate_queries(filter).await.unwrap();
        }
    });
    let (proxy, recorder, cache) = setup(overrides);

    let caller_order = order.clone();
    let options = proxy
        .at("posts.create")
        .mutation_options(
            MutationOptionsIn::new()
                .meta(json!({"toast": true}))
                .on_success(move |data: &Value, input: &Value| {
                    assert_eq!(data["input"], *input);
                    caller_order.lock().unwrap().push("caller".to_string());
                }),
        )
        .unwrap();

    assert_eq!(
        serde_json::to_value(&options.mutation_key).unwrap(),
        json!([["posts", "create"]])
    );

    let data = options.execute(json!({"title": "hi"})).await.unwrap();
    assert_eq!(data["path"], json!("posts.create"));

    assert_eq!(*order.lock().unwrap(), vec!["caller", "hook:posts.create"]);
    let invalidated = cache.invalidated.lock().unwrap();
    assert_eq!(invalidated.len(), 1);
    assert_eq!(invalidated[0].query_key.path(), ["posts"]);

    let seen = recorder.seen();
    assert_eq!(seen[0].kind, OperationType::Mutation);
    assert_eq!(seen[0].input, Some(json!({"title": "hi"})));
}

#[tokio::test]
async fn test_mutation_error_skips_success_handlers() {
    let hook_ran = Arc::new(Mutex::new(false));
    let flag = hook_ran.clone();
    let overrides = MutationOverrides::on_success(move |_ctx| {
        let flag = flag.clone();
        async move {
            *flag.lock().unwrap() = true;
        }
    });
    let (proxy, _, cache) = setup(overrides);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let options = proxy
        .at("posts.fail")
        .mutation_options(MutationOptionsIn::new().on_error(move |error: &ClientError, _input: &Value| {
            sink.lock().unwrap().push(error.code());
        }))
        .unwrap();

    let err = options.execute(json!({"title": "dup"})).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { ref shape, .. } if shape.code == ErrorCode::Conflict));
    assert_eq!(*errors.lock().unwrap(), vec![Some(ErrorCode::Conflict)]);
    assert!(!*hook_ran.lock().unwrap());
    assert!(cache.invalidated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_path_invalidation() {
    let (proxy, _, cache) = setup(MutationOverrides::default());
    proxy.at("posts").invalidate().await.unwrap();
    proxy.at("posts").at("list").cancel().await.unwrap();
    proxy.invalidate(proxy.path_filter("users")).await.unwrap();

    let invalidated = cache.invalidated.lock().unwrap();
    assert_eq!(invalidated[0], QueryFilter::new(QueryKey::for_path(&["posts"])));
    assert_eq!(invalidated[1].query_key.path(), ["users"]);
    assert_eq!(
        cache.cancelled.lock().unwrap()[0].query_key.path(),
        ["posts", "list"]
    );
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

#[derive(Debug, PartialEq)]
enum Event {
    Started,
    Data(Value),
    Error(String),
    Stopped,
}

fn recording_options(tx: mpsc::UnboundedSender<Event>) -> SubscriptionOptionsIn<Value> {
    let started = tx.clone();
    let data = tx.clone();
    let error = tx.clone();
    SubscriptionOptionsIn::new()
        .on_started(move || {
            let _ = started.send(Event::Started);
        })
        .on_data(move |item: &Value| {
            let _ = data.send(Event::Data(item.clone()));
        })
        .on_error(move |e: &ClientError| {
            let _ = error.send(Event::Error(e.to_string()));
        })
        .on_stopped(move || {
            let _ = tx.send(Event::Stopped);
        })
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a subscription event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_subscription_runs_to_completion() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = proxy
        .at("feed")
        .subscription_options(json!({"room": "a"}), recording_options(tx))
        .unwrap();
    assert_eq!(
        serde_json::to_value(&options.query_key).unwrap(),
        json!([["feed"], {"input": {"room": "a"}}])
    );

    let subscription = Subscription::start(options);
    assert_eq!(next_event(&mut rx).await, Event::Started);
    for seq in 1..=3 {
        assert_eq!(next_event(&mut rx).await, Event::Data(json!({"seq": seq})));
    }
    assert_eq!(next_event(&mut rx).await, Event::Stopped);
    assert_eq!(subscription.status(), SubscriptionStatus::Success);
    assert_eq!(subscription.state().data(), Some(&json!({"seq": 3})));

    let seen = recorder.seen();
    assert_eq!(seen[0].kind, OperationType::Subscription);
    assert_eq!(seen[0].input, Some(json!({"room": "a"})));
}

#[tokio::test]
async fn test_subscription_unsubscribe_returns_to_idle() {
    let (proxy, _, _) = setup(MutationOverrides::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = proxy
        .at("ticks")
        .subscription_options(Value::Null, recording_options(tx))
        .unwrap();

    let mut subscription = Subscription::start(options);
    let mut states = subscription.watch();
    assert_eq!(next_event(&mut rx).await, Event::Started);
    assert_eq!(next_event(&mut rx).await, Event::Data(json!({"seq": 1})));

    let state = states
        .wait_for(|state| state.status() == SubscriptionStatus::Success)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.data(), Some(&json!({"seq": 1})));

    subscription.unsubscribe().await;
    assert_eq!(next_event(&mut rx).await, Event::Stopped);
    assert_eq!(subscription.status(), SubscriptionStatus::Idle);
}

#[tokio::test]
async fn test_subscription_disabled_stays_idle() {
    let (proxy, recorder, _) = setup(MutationOverrides::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let options = proxy
        .at("feed")
        .subscription_options(json!({}), recording_options(tx).enabled(false))
        .unwrap();

    let subscription = Subscription::start(options);
    tokio::task::yield_now().await;
    assert_eq!(subscription.status(), SubscriptionStatus::Idle);
    assert!(recorder.seen().is_empty());

    let skipped = proxy
        .at("feed")
        .subscription_options(SkipToken, SubscriptionOptionsIn::new())
        .unwrap();
    assert!(!skipped.options.enabled);
}

#[tokio::test]
async fn test_subscription_over_http_errors() {
    let link = HttpLink::with_reqwest(
        HttpLinkConfig::new("http://127.0.0.1:9"),
        HttpClientConfig::default(),
    )
    .unwrap();
    let client = UntypedClient::new(LinkChain::single(link));
    let proxy = OptionsProxy::new(
        client,
        Arc::new(RecordingCache::default()),
        MutationOverrides::default(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = proxy
        .at("onMessage")
        .subscription_options(Value::Null, recording_options(tx))
        .unwrap();
    let subscription = Subscription::start(options);

    match next_event(&mut rx).await {
        Event::Error(message) => assert!(message.contains("Subscriptions are unsupported")),
        other => panic!("expected an error event, got {:?}", other),
    }
    let mut states = subscription.watch();
    let state = states
        .wait_for(|state| state.status() == SubscriptionStatus::Error)
        .await
        .unwrap()
        .clone();
    assert!(matches!(
        state.error(),
        Some(ClientError::UnsupportedOperation(_))
    ));
}

// ============================================================================
// CONTEXT
// ============================================================================

#[tokio::test]
async fn test_service_init_then_proxy() {
    let recorder = Recorder::default();
    let context = RpcContext::builder()
        .client(UntypedClient::new(LinkChain::single(recorder.clone())))
        .query_client(Arc::new(RecordingCache::default()))
        .build()
        .unwrap();

    let service = RpcService::new();
    assert!(matches!(
        service.proxy().await.unwrap_err(),
        ClientError::Configuration(_)
    ));

    service.init(context.clone()).await;
    service.init(context).await;
    let proxy = service.proxy().await.unwrap();
    let options = proxy.at("hello").query_options(Value::Null, QueryOverrides::new()).unwrap();
    options.fetch(QueryFnContext::default()).unwrap().await.unwrap();
    assert_eq!(recorder.seen()[0].input, None);
}
