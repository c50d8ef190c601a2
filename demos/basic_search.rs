//! Basic example: point the client at a cluster, search, index a document.
//!
//! Run with a local backend listening on 9200:
//! `cargo run --example basic_search`

use nodehop::{Client, Error};
use serde_json::Value;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // per-attempt lines at debug; set tracer=trace to see curl-format traces
    tracing_subscriber::fmt()
        .with_env_filter("nodehop=debug,tracer=trace")
        .init();

    let client = Client::builder()
        .node("http://localhost:9200")?
        .max_retry_timeout(Duration::from_secs(10))
        .build()?;

    println!("=== index a document ===");
    let doc = r#"{"title": "The Rust Programming Language", "year": 2019}"#;
    let created = client.put("/library/book/1", doc).await?;
    println!("status: {}", created.status);

    println!("=== search ===");
    let response = client
        .perform_request("GET", "/library/_search", &[("q", "title:rust")], None)
        .await?;
    println!("answered by {} in {:?}", response.host, response.latency);

    let hits: Value = response.json()?;
    println!("hits: {}", hits["hits"]["total"]);

    println!("=== existence probe ===");
    let probe = client.head("/library/book/2").await?;
    println!("book 2 exists: {}", probe.status.as_u16() != 404);

    Ok(())
}
