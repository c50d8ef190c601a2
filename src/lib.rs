//! # nodehop - a failover-aware HTTP client for clustered search backends
//!
//! `nodehop` dispatches HTTP requests across a pool of backend nodes. It
//! keeps per-node health, round-robins across the live nodes, and — when a
//! node fails at the transport level or answers with a gateway error — moves
//! on to the next one until the request succeeds, the pool is exhausted, or
//! the retry budget runs out. Failed nodes are blacklisted with exponential
//! backoff and rehabilitated over time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nodehop::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nodehop::Error> {
//!     let client = Client::builder()
//!         .node("http://search-1:9200")?
//!         .node("http://search-2:9200")?
//!         .node("http://search-3:9200")?
//!         .max_retry_timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     // a search against whichever node is up
//!     let response = client
//!         .perform_request("GET", "/library/_search", &[("q", "title:rust")], None)
//!         .await?;
//!     println!("status: {}", response.status);
//!     println!("answered by: {}", response.host);
//!     println!("body: {}", response.text());
//!
//!     // index a document; POST/PUT carry the body as bytes
//!     let doc = r#"{"title": "The Rust Programming Language"}"#;
//!     let created = client.put("/library/book/1", doc).await?;
//!     println!("indexed with {} attempt(s)", created.attempts);
//!
//!     // HEAD probes for existence; 404 is a normal answer, not an error
//!     let probe = client.head("/library/book/2").await?;
//!     println!("exists: {}", probe.status.as_u16() != 404);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Failure handling
//!
//! Every failed request surfaces exactly one [`Error`]; the per-attempt
//! history of a multi-node walk is attached in chronological order:
//!
//! ```no_run
//! use nodehop::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().node("http://localhost:9200")?.build()?;
//! match client.get("/library/_search").await {
//!     Ok(response) => println!("ok: {}", response.status),
//!     Err(Error::RetryTimeout { causes, .. }) => {
//!         eprintln!("retry budget exhausted after {} attempts", causes.len());
//!     }
//!     Err(err) => {
//!         eprintln!("gave up: {err}");
//!         for cause in err.causes() {
//!             eprintln!("  earlier attempt: {cause}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## What counts as retryable
//!
//! - Transport errors (connect refused, reset, I/O timeout): try the next
//!   node, mark this one dead.
//! - 502, 503, 504: same treatment — that is the gateway or the node
//!   struggling, not the request.
//! - Any other non-2xx status ends the request and leaves the node healthy;
//!   the request itself is at fault. Exception: 404 in answer to a HEAD is a
//!   success, preserving the backend convention that HEAD probes existence.
//!
//! ## Logging
//!
//! `nodehop` logs one debug line per attempt through [`tracing`]. Enabling
//! TRACE on the dedicated `tracer` target additionally emits every request
//! and response in a curl-replayable form:
//!
//! ```text
//! curl -iX POST 'http://search-1:9200/library/_search' -d '{"query":{}}'
//! # HTTP/1.1 200 OK
//! # content-type: application/json
//! #
//! # {"hits":{"total":3}}
//! ```

mod client;
mod error;
mod pool;
mod request;
mod response;
mod trace;

pub use client::{Client, ClientBuilder, DEFAULT_MAX_RETRY_TIMEOUT};
pub use error::{Error, Result};
pub use pool::{Connection, ConnectionPool, Host};
pub use request::Method;
pub use response::Response;
