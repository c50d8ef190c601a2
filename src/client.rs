//! The dispatcher: node selection, retries, and health callbacks.
//!
//! [`Client`] is the main entry point. Given a logical request it asks the
//! [`ConnectionPool`] for an iteration order, issues the HTTP call against
//! each candidate in turn, classifies every outcome, feeds the pool's health
//! state machine, and returns either the first successful response or a
//! single error carrying the whole attempt history.

use crate::pool::{ConnectionPool, Host};
use crate::request::{Method, PreparedRequest};
use crate::response::{RawResponse, Response};
use crate::trace;
use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default ceiling on the time a single logical request may spend retrying.
pub const DEFAULT_MAX_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Soft margin on the retry budget, so a request that has nearly consumed it
/// does not get one more attempt that is doomed to time out.
fn soft_deadline(max_retry_timeout: Duration) -> Duration {
    Duration::from_millis((max_retry_timeout.as_millis() as f64 * 0.98).round() as u64)
}

/// A failover-aware HTTP client for a clustered search backend.
///
/// The client is cheap to clone and shares its connection pool and transport
/// across clones; it is designed to be created once and reused for the life
/// of the process.
///
/// # Examples
///
/// ```no_run
/// use nodehop::Client;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), nodehop::Error> {
/// let client = Client::builder()
///     .node("http://search-1:9200")?
///     .node("http://search-2:9200")?
///     .max_retry_timeout(Duration::from_secs(10))
///     .build()?;
///
/// // a query against whichever node is up
/// let response = client
///     .perform_request("GET", "/library/_search", &[("q", "title:rust")], None)
///     .await?;
/// println!("{}", response.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pool: ConnectionPool,
    http: reqwest::Client,
    max_retry_timeout: Duration,
    default_headers: HeaderMap,
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The pool backing this client, for health introspection.
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Executes one logical request with failover.
    ///
    /// The method name is parsed case-insensitively into one of GET, HEAD,
    /// POST, PUT, DELETE; query parameters are appended to `endpoint` in the
    /// order given; `body` rides along unchanged. Build errors (bad method,
    /// bad URI, HEAD with a body) surface before any node is contacted.
    ///
    /// Transport failures and 502/503/504 responses mark the node dead and
    /// move on to the next candidate until the pool or the retry budget is
    /// exhausted. Any other non-2xx status ends the request immediately and
    /// leaves the node healthy, since the node answered and the request
    /// itself is at fault. As the one exception, a 404 answer to a HEAD is a
    /// success: HEAD is how callers probe for existence.
    pub async fn perform_request(
        &self,
        method: &str,
        endpoint: &str,
        params: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<Response> {
        let method = Method::parse(method)?;
        let request = PreparedRequest::new(method, endpoint, params, body)?;
        self.dispatch(request).await
    }

    /// `GET` without parameters or body.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        self.perform_request("GET", endpoint, &[], None).await
    }

    /// `HEAD`, typically an existence probe; 404 counts as success.
    pub async fn head(&self, endpoint: &str) -> Result<Response> {
        self.perform_request("HEAD", endpoint, &[], None).await
    }

    /// `POST` with a body.
    pub async fn post(&self, endpoint: &str, body: impl Into<Bytes>) -> Result<Response> {
        self.perform_request("POST", endpoint, &[], Some(body.into()))
            .await
    }

    /// `PUT` with a body.
    pub async fn put(&self, endpoint: &str, body: impl Into<Bytes>) -> Result<Response> {
        self.perform_request("PUT", endpoint, &[], Some(body.into()))
            .await
    }

    /// `DELETE` without a body.
    pub async fn delete(&self, endpoint: &str) -> Result<Response> {
        self.perform_request("DELETE", endpoint, &[], None).await
    }

    async fn dispatch(&self, request: PreparedRequest) -> Result<Response> {
        let mut candidates = self.inner.pool.next_connection();
        if candidates.is_empty() {
            let last_resort = self.inner.pool.last_resort_connection();
            tracing::info!("no healthy nodes available, trying {}", last_resort.host());
            candidates = vec![last_resort];
        }

        let retry_deadline = soft_deadline(self.inner.max_retry_timeout);
        let start = Instant::now();
        let mut last_seen: Option<Error> = None;
        let mut attempts = 0usize;

        for connection in candidates {
            if last_seen.is_some() && start.elapsed() >= retry_deadline {
                return Err(Error::RetryTimeout {
                    budget: retry_deadline,
                    causes: Vec::new(),
                }
                .after(last_seen.take()));
            }

            attempts += 1;
            let host = connection.host().clone();

            let raw = match self.execute(&request, &host).await {
                Ok(raw) => raw,
                Err(source) => {
                    trace::log_transport_failure("request failed", &request, &host, &source);
                    self.inner.pool.on_failure(&host);
                    last_seen = Some(
                        Error::Transport {
                            host,
                            source,
                            causes: Vec::new(),
                        }
                        .after(last_seen.take()),
                    );
                    continue;
                }
            };

            let status = raw.status;
            if status.is_success()
                || (request.method == Method::Head && status == StatusCode::NOT_FOUND)
            {
                trace::log_response("request succeeded", &request, &host, &raw);
                self.inner.pool.on_success(&host);
                return Ok(Response::new(
                    request.method,
                    host,
                    request.path_and_query.clone(),
                    raw,
                    attempts,
                    start.elapsed(),
                ));
            }

            trace::log_response("request failed", &request, &host, &raw);
            let error = Error::Http {
                method: request.method,
                host: host.clone(),
                path: request.path_and_query.clone(),
                status,
                headers: raw.headers,
                body: String::from_utf8_lossy(&raw.body).into_owned(),
                causes: Vec::new(),
            }
            .after(last_seen.take());

            if matches!(status.as_u16(), 502 | 503 | 504) {
                // gateway trouble speaks to the node's health, not the request
                self.inner.pool.on_failure(&host);
                last_seen = Some(error);
            } else {
                // the node answered; the error is the caller's problem
                self.inner.pool.on_success(&host);
                return Err(error);
            }
        }

        match last_seen {
            Some(error) => Err(error),
            // the candidate list is never empty and every failed attempt
            // records its error, so this arm is unreachable in practice
            None => Err(Error::Config(
                "request finished without attempting any connection".to_string(),
            )),
        }
    }

    /// One attempt against one host, buffered in full.
    async fn execute(
        &self,
        request: &PreparedRequest,
        host: &Host,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let url = format!("{}{}", host, request.path_and_query);
        let mut builder = self
            .inner
            .http
            .request(request.method.to_reqwest(), url)
            .headers(self.inner.default_headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;
        let version = response.version();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(RawResponse {
            version,
            status,
            headers,
            body,
        })
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use nodehop::{Client, Host};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), nodehop::Error> {
/// let client = Client::builder()
///     .nodes(["http://search-1:9200", "http://search-2:9200"])?
///     .host(Host::https("search-3.internal", 9243))
///     .timeout(Duration::from_secs(5))
///     .default_header("x-opaque-id", "reindex-job")?
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    hosts: Vec<Host>,
    max_retry_timeout: Duration,
    timeout: Option<Duration>,
    default_headers: HeaderMap,
}

impl ClientBuilder {
    /// Creates a builder with the default retry budget and no nodes.
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            max_retry_timeout: DEFAULT_MAX_RETRY_TIMEOUT,
            timeout: None,
            default_headers: HeaderMap::new(),
        }
    }

    /// Adds a backend node by URL, e.g. `http://localhost:9200`.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL does not parse as a plain
    /// scheme-host-port node address.
    pub fn node(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.hosts.push(Host::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds several backend nodes by URL.
    pub fn nodes<I, S>(mut self, urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.hosts.push(Host::parse(url.as_ref())?);
        }
        Ok(self)
    }

    /// Adds an already constructed [`Host`].
    pub fn host(mut self, host: Host) -> Self {
        self.hosts.push(host);
        self
    }

    /// Ceiling on the total time one request may spend across retries.
    /// Defaults to [`DEFAULT_MAX_RETRY_TIMEOUT`].
    pub fn max_retry_timeout(mut self, timeout: Duration) -> Self {
        self.max_retry_timeout = timeout;
        self
    }

    /// Per-attempt transport timeout. Unset by default, in which case each
    /// attempt runs to the transport's own limits.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error when the name or value is not a valid header.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Config(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Config(format!("invalid header value: {e}")))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Requires at least one node and a retry budget greater than zero.
    pub fn build(self) -> Result<Client> {
        if self.max_retry_timeout.is_zero() {
            return Err(Error::Config(
                "max_retry_timeout must be greater than 0".to_string(),
            ));
        }
        let pool = ConnectionPool::new(self.hosts)?;
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| Error::Config(format!("failed to build http transport: {e}")))?;
        Ok(Client {
            inner: Arc::new(ClientInner {
                pool,
                http,
                max_retry_timeout: self.max_retry_timeout,
                default_headers: self.default_headers,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
