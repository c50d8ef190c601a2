//! Buffered responses returned by a successful dispatch.

use crate::pool::Host;
use crate::request::Method;
use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;

/// What the transport handed back for one attempt, fully buffered.
///
/// Buffering up front is what lets the same bytes feed the curl trace, an
/// [`Error::Http`] body, or the caller, without ever re-reading a stream.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

/// A successful response, together with where it came from and what it cost.
///
/// # Examples
///
/// ```no_run
/// use nodehop::Client;
/// use serde_json::Value;
///
/// # async fn example() -> Result<(), nodehop::Error> {
/// let client = Client::builder()
///     .node("http://localhost:9200")?
///     .build()?;
///
/// let response = client.get("/_cluster/health").await?;
///
/// println!("{} from {}", response.status, response.host);
/// println!("took {:?} over {} attempt(s)", response.latency, response.attempts);
///
/// let health: Value = response.json()?;
/// println!("cluster status: {}", health["status"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The verb of the request this answers.
    pub method: Method,

    /// The node that produced the response.
    pub host: Host,

    /// Path and query the request was issued with.
    pub path: String,

    /// The protocol version the server answered with.
    pub version: Version,

    /// The response status.
    pub status: StatusCode,

    /// The response headers, in wire order.
    pub headers: HeaderMap,

    /// The buffered response body.
    pub body: Bytes,

    /// How many nodes were tried before this response, this one included.
    pub attempts: usize,

    /// Total time across all attempts of this request.
    pub latency: Duration,
}

impl Response {
    pub(crate) fn new(
        method: Method,
        host: Host,
        path: String,
        raw: RawResponse,
        attempts: usize,
        latency: Duration,
    ) -> Self {
        Self {
            method,
            host,
            path,
            version: raw.version,
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            attempts,
            latency,
        }
    }

    /// The body as text, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decodes the body as JSON into the requested type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] carrying the raw body, the decoder
    /// message and the response status.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization {
            raw_response: self.text().into_owned(),
            serde_error: e.to_string(),
            status: self.status,
        })
    }

    /// A header value by name, when present and valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Whether more than one node was tried.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_body(body: &'static [u8]) -> Response {
        Response::new(
            Method::Get,
            Host::http("node", 9200),
            "/x".to_string(),
            RawResponse {
                version: Version::HTTP_11,
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body),
            },
            1,
            Duration::from_millis(3),
        )
    }

    #[test]
    fn json_decodes_the_buffered_body() {
        let response = response_with_body(br#"{"took": 5}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["took"], 5);
    }

    #[test]
    fn json_failure_preserves_the_raw_body() {
        let response = response_with_body(b"not json");
        match response.json::<serde_json::Value>() {
            Err(Error::Deserialization {
                raw_response,
                status,
                ..
            }) => {
                assert_eq!(raw_response, "not json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("expected Deserialization error, got {other:?}"),
        }
    }

    #[test]
    fn was_retried_reflects_the_attempt_count() {
        let mut response = response_with_body(b"");
        assert!(!response.was_retried());
        response.attempts = 3;
        assert!(response.was_retried());
    }
}
