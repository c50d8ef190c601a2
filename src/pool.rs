//! Connection pool and per-node health bookkeeping.
//!
//! The pool owns one [`Connection`] record per backend [`Host`] and decides,
//! for every request, which nodes to try and in what order. Nodes that fail
//! are blacklisted for an exponentially growing window (one minute doubling
//! up to thirty minutes); once the window elapses they become rehabilitation
//! candidates and are offered again after all live nodes.

use crate::{Error, Result};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

const BACKOFF_BASE: Duration = Duration::from_secs(60);
const BACKOFF_CAP: Duration = Duration::from_secs(30 * 60);

/// Time a node stays off rotation after its `dead_count`-th consecutive
/// failure: `min(60s * 2^(dead_count - 1), 30 minutes)`.
pub(crate) fn backoff(dead_count: u32) -> Duration {
    // 2^15 minutes is already past the cap, so clamping the exponent keeps
    // the shift in range without changing the result
    let exp = dead_count.saturating_sub(1).min(15);
    BACKOFF_BASE.saturating_mul(1u32 << exp).min(BACKOFF_CAP)
}

/// An addressable backend endpoint: scheme, hostname and port.
///
/// `Host` is a pure value and is the identity of a pool entry. Its `Display`
/// form is `scheme://hostname:port`, which is also what the curl trace and
/// log lines print.
///
/// # Examples
///
/// ```
/// use nodehop::Host;
///
/// let host = Host::parse("http://localhost:9200")?;
/// assert_eq!(host.to_string(), "http://localhost:9200");
/// assert_eq!(host, Host::http("localhost", 9200));
/// # Ok::<(), nodehop::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    scheme: String,
    hostname: String,
    port: u16,
}

impl Host {
    /// Creates an `http` host.
    pub fn http(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            hostname: hostname.into(),
            port,
        }
    }

    /// Creates an `https` host.
    pub fn https(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "https".to_string(),
            hostname: hostname.into(),
            port,
        }
    }

    /// Parses a node URL such as `http://localhost:9200`.
    ///
    /// Only `http` and `https` schemes are accepted, the port defaults to the
    /// scheme's well-known port, and the URL must not carry a path: a node
    /// address identifies a server, not an endpoint.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(Error::Config(format!(
                "unsupported scheme '{scheme}' in node url '{input}'"
            )));
        }
        let hostname = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("node url '{input}' has no host")))?
            .to_string();
        if url.path() != "/" && !url.path().is_empty() {
            return Err(Error::Config(format!(
                "node url '{input}' must not contain a path"
            )));
        }
        let port = url
            .port_or_known_default()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        Ok(Self {
            scheme: scheme.to_string(),
            hostname,
            port,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.hostname, self.port)
    }
}

/// Health record for a single backend host.
///
/// Owned by the [`ConnectionPool`]; the values handed out by
/// [`ConnectionPool::next_connection`] and [`ConnectionPool::connections`]
/// are snapshots taken under the pool lock.
#[derive(Debug, Clone)]
pub struct Connection {
    host: Host,
    dead_count: u32,
    dead_until: Option<Instant>,
    last_failure: Option<Instant>,
}

impl Connection {
    fn new(host: Host) -> Self {
        Self {
            host,
            dead_count: 0,
            dead_until: None,
            last_failure: None,
        }
    }

    /// The host this record tracks. A connection's identity is its host.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Whether the node is currently considered live.
    pub fn is_alive(&self) -> bool {
        self.dead_until.is_none()
    }

    /// Consecutive failures since the last success.
    pub fn dead_count(&self) -> u32 {
        self.dead_count
    }

    /// Soonest moment the node may be retried, when dead.
    pub fn dead_until(&self) -> Option<Instant> {
        self.dead_until
    }

    /// When the node last failed, if it ever did.
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    fn mark_alive(&mut self) {
        self.dead_count = 0;
        self.dead_until = None;
    }

    fn mark_dead(&mut self, now: Instant) {
        self.dead_count = self.dead_count.saturating_add(1);
        self.last_failure = Some(now);
        self.dead_until = Some(now + backoff(self.dead_count));
    }
}

/// The set of backend connections plus their health state machine.
///
/// Selection and health callbacks may be driven from any number of concurrent
/// requests; every mutation happens under a single lock whose critical
/// sections are short and never held across I/O.
///
/// # Examples
///
/// ```
/// use nodehop::{ConnectionPool, Host};
///
/// let pool = ConnectionPool::new([
///     Host::http("search-1", 9200),
///     Host::http("search-2", 9200),
/// ])?;
///
/// let candidates = pool.next_connection();
/// assert_eq!(candidates.len(), 2);
/// # Ok::<(), nodehop::Error>(())
/// ```
pub struct ConnectionPool {
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    connections: Vec<Connection>,
    rotation: usize,
}

impl ConnectionPool {
    /// Creates a pool over the given hosts, deduplicating by host identity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no host is given: a pool must
    /// always contain at least one connection.
    pub fn new(hosts: impl IntoIterator<Item = Host>) -> Result<Self> {
        let mut connections: Vec<Connection> = Vec::new();
        for host in hosts {
            if connections.iter().all(|c| c.host != host) {
                connections.push(Connection::new(host));
            }
        }
        if connections.is_empty() {
            return Err(Error::Config(
                "connection pool requires at least one host".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(PoolInner {
                connections,
                rotation: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the connections to try for the next request, in order.
    ///
    /// Live connections come first, rotated so successive calls start at
    /// successive hosts; dead connections whose blacklist window has elapsed
    /// follow, longest-overdue first. The result is empty when every node is
    /// dead and still inside its window.
    pub fn next_connection(&self) -> Vec<Connection> {
        let now = Instant::now();
        let mut inner = self.lock();
        let rotation = inner.rotation;
        inner.rotation = inner.rotation.wrapping_add(1);

        let alive: Vec<Connection> = inner
            .connections
            .iter()
            .filter(|c| c.is_alive())
            .cloned()
            .collect();

        let mut ordered = Vec::with_capacity(inner.connections.len());
        if !alive.is_empty() {
            let start = rotation % alive.len();
            ordered.extend_from_slice(&alive[start..]);
            ordered.extend_from_slice(&alive[..start]);
        }

        let mut overdue: Vec<Connection> = inner
            .connections
            .iter()
            .filter(|c| matches!(c.dead_until, Some(until) if until <= now))
            .cloned()
            .collect();
        overdue.sort_by_key(|c| c.dead_until);
        ordered.extend(overdue);
        ordered
    }

    /// Some connection regardless of state, for when [`Self::next_connection`]
    /// came back empty: the dead connection longest past its `dead_until`,
    /// ties broken by configuration order.
    ///
    /// Probing one blacklisted node keeps the client live through transient
    /// mass failure; a success re-opens the pool.
    pub fn last_resort_connection(&self) -> Connection {
        let inner = self.lock();
        inner
            .connections
            .iter()
            .filter(|c| !c.is_alive())
            .min_by_key(|c| c.dead_until)
            .unwrap_or(&inner.connections[0])
            .clone()
    }

    /// Records a successful attempt: the node is live again and its failure
    /// streak is over.
    pub fn on_success(&self, host: &Host) {
        let mut inner = self.lock();
        if let Some(connection) = inner.connections.iter_mut().find(|c| &c.host == host) {
            connection.mark_alive();
        }
    }

    /// Records a failed attempt: the node goes dark for
    /// `min(60s * 2^(dead_count - 1), 30 minutes)`.
    pub fn on_failure(&self, host: &Host) {
        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(connection) = inner.connections.iter_mut().find(|c| &c.host == host) {
            connection.mark_dead(now);
        }
    }

    /// Health snapshot of every connection, in configuration order.
    pub fn connections(&self) -> Vec<Connection> {
        self.lock().connections.clone()
    }

    #[cfg(test)]
    fn set_dead_until(&self, host: &Host, dead_until: Option<Instant>) {
        let mut inner = self.lock();
        if let Some(connection) = inner.connections.iter_mut().find(|c| &c.host == host) {
            connection.dead_until = dead_until;
        }
    }
}
