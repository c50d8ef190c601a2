//! Error types for the dispatcher.
//!
//! A failed request surfaces exactly one [`Error`]; when several nodes were
//! tried, the earlier per-attempt failures ride along in [`Error::causes`],
//! oldest first, so the full attempt history is always inspectable.

use crate::pool::Host;
use crate::request::Method;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// The error type for dispatcher operations.
///
/// # Examples
///
/// ```no_run
/// use nodehop::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .node("http://localhost:9200")?
///     .build()?;
///
/// match client.get("/index/_search").await {
///     Ok(response) => println!("hits: {}", response.text()),
///     Err(Error::Http { status, body, .. }) => {
///         eprintln!("search rejected with {status}: {body}");
///     }
///     Err(err) => {
///         eprintln!("request failed: {err}");
///         for (i, cause) in err.causes().iter().enumerate() {
///             eprintln!("  attempt {}: {cause}", i + 1);
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration: empty pool, zero retry budget, bad header, or
    /// a malformed node address.
    #[error("configuration error: {0}")]
    Config(String),

    /// The endpoint plus query parameters did not form a valid URI.
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// A node URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The method name is not one of GET, HEAD, POST, PUT, DELETE.
    #[error("http method not supported: {0}")]
    UnsupportedMethod(String),

    /// A method/body combination the transport refuses, such as HEAD with a
    /// body.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A transport-level failure (connect, socket, I/O) against one host.
    #[error("error while performing request on {host}: {source}")]
    Transport {
        /// The host the attempt was issued against.
        host: Host,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
        /// Failures of earlier attempts, oldest first.
        causes: Vec<Error>,
    },

    /// The server answered with a status the dispatcher does not treat as
    /// success. 502, 503 and 504 are retried against further nodes; anything
    /// else ends the request, since the fault lies with the request rather
    /// than the node.
    #[error("{method} {host}{path} returned {status}")]
    Http {
        /// The verb of the failed request.
        method: Method,
        /// The host that produced the response.
        host: Host,
        /// Path and query of the failed request.
        path: String,
        /// The response status.
        status: StatusCode,
        /// The response headers, in wire order.
        headers: HeaderMap,
        /// The buffered response body, lossily decoded.
        body: String,
        /// Failures of earlier attempts, oldest first.
        causes: Vec<Error>,
    },

    /// The retry budget elapsed before the pool was exhausted.
    #[error("request retries exceeded max retry timeout [{budget:?}]")]
    RetryTimeout {
        /// The effective (soft-margin) retry deadline.
        budget: Duration,
        /// Failures of the attempts made before the budget ran out, oldest
        /// first.
        causes: Vec<Error>,
    },

    /// The response body did not parse as the requested type.
    ///
    /// Preserves the raw body alongside the decoder message so production
    /// failures stay debuggable.
    #[error("failed to deserialize response body (status {status}): {serde_error}")]
    Deserialization {
        /// The raw response body that failed to decode.
        raw_response: String,
        /// The decoder's error message.
        serde_error: String,
        /// The status of the response the body came from.
        status: StatusCode,
    },
}

/// A specialized `Result` for dispatcher operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Per-attempt failures that led up to this error, in chronological
    /// order. Empty for errors raised before the first attempt and for
    /// first-attempt failures.
    pub fn causes(&self) -> &[Error] {
        match self {
            Error::Transport { causes, .. }
            | Error::Http { causes, .. }
            | Error::RetryTimeout { causes, .. } => causes,
            _ => &[],
        }
    }

    fn causes_mut(&mut self) -> Option<&mut Vec<Error>> {
        match self {
            Error::Transport { causes, .. }
            | Error::Http { causes, .. }
            | Error::RetryTimeout { causes, .. } => Some(causes),
            _ => None,
        }
    }

    /// Makes `self` the newest error of a retry sequence: the previous
    /// error's history is flattened into `self.causes`, oldest first, with
    /// the previous error itself appended last.
    pub(crate) fn after(mut self, earlier: Option<Error>) -> Error {
        if let Some(mut previous) = earlier {
            let mut chain = previous
                .causes_mut()
                .map(std::mem::take)
                .unwrap_or_default();
            chain.push(previous);
            if let Some(slot) = self.causes_mut() {
                *slot = chain;
            }
        }
        self
    }

    /// The HTTP status carried by this error, when there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } | Error::Deserialization { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The raw response body carried by this error, when there is one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Http { body, .. } => Some(body),
            Error::Deserialization { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}
