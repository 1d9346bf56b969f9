// rpclink example: basic client
// Talks to a server at RPC_URL (default http://localhost:3000/trpc):
// - typed query through a procedure descriptor
// - untyped mutation through the path proxy
// - explicit batch on the HTTP link

use anyhow::Result;
use rpclink_client::{logging::init_logging, procedures, Client, LoggerLink, RequestOptions};
use rpclink_transport::{HttpClientConfig, HttpLink, HttpLinkConfig};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct Greet {
    pub name: String,
}

procedures! {
    pub mod api {
        query HELLO: "hello" => (Greet, String);
        mutation GREETING: "greeting" => (Greet, String);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let url = std::env::var("RPC_URL").unwrap_or_else(|_| "http://localhost:3000/trpc".to_string());
    let client = Client::builder()
        .link(LoggerLink::new())
        .http(&url)?
        .contract(api::contract())
        .build()?;

    match client
        .procedure(&api::HELLO)
        .query(&Greet { name: "World".into() })
        .await
    {
        Ok(greeting) => info!("hello: {}", greeting),
        Err(e) => warn!("hello failed: {}", e),
    }

    let greeting = client
        .at("greeting")
        .mutate_with(Some(json!({"name": "World"})), RequestOptions::new().context("source", json!("example")))
        .await;
    match greeting {
        Ok(value) => info!("greeting: {}", value),
        Err(e) => warn!("greeting failed (status {:?}): {}", e.http_status(), e),
    }

    let link = HttpLink::with_reqwest(HttpLinkConfig::new(&url), HttpClientConfig::default())?;
    let mut batch = link.batch();
    let first = batch.query("hello", Some(json!({"name": "first"})))?;
    let second = batch.query("hello", Some(json!({"name": "second"})))?;
    let results = batch.execute().await?;
    info!("batched: {:?} / {:?}", results.get(&first), results.get(&second));

    Ok(())
}
