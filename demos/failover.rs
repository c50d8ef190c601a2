//! Failover example: one node of the pool is unreachable, the request still
//! succeeds, and the pool remembers which node is dark.
//!
//! Run with a local backend listening on 9200:
//! `cargo run --example failover`

use nodehop::{Client, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("nodehop=debug")
        .init();

    // nothing listens on 9999; the dispatcher fails over to 9200
    let client = Client::builder()
        .nodes(["http://localhost:9999", "http://localhost:9200"])?
        .build()?;

    let response = client.get("/_cluster/health").await?;
    println!(
        "got {} from {} after {} attempt(s)",
        response.status, response.host, response.attempts
    );

    println!("pool health:");
    for connection in client.pool().connections() {
        println!(
            "  {} alive={} consecutive_failures={}",
            connection.host(),
            connection.is_alive(),
            connection.dead_count()
        );
    }

    Ok(())
}
