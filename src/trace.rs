//! Per-attempt logging and curl-formatted request/response tracing.
//!
//! Every attempt produces one debug line with method, host, path and the
//! status or error. When the `tracer` target has TRACE enabled, the full
//! request and response are additionally rendered in a form a human can
//! replay with curl. Bodies are buffered before they get here, so rendering
//! never consumes anything destined for the wire.

use crate::pool::Host;
use crate::request::PreparedRequest;
use crate::response::RawResponse;
use tracing::Level;

/// Target of the curl-formatted trace output, kept separate from the
/// per-attempt debug lines so it can be enabled on its own.
pub(crate) const TRACER_TARGET: &str = "tracer";

/// Logs an attempt that yielded a response.
pub(crate) fn log_response(
    message: &str,
    request: &PreparedRequest,
    host: &Host,
    response: &RawResponse,
) {
    tracing::debug!(
        "{message} [{} {host}{}] [{:?} {}]",
        request.method,
        request.path_and_query,
        response.version,
        response.status,
    );
    if tracing::enabled!(target: TRACER_TARGET, Level::TRACE) {
        tracing::trace!(
            target: TRACER_TARGET,
            "{}\n{}",
            curl_request(request, host),
            curl_response(response),
        );
    }
}

/// Logs an attempt that failed at the transport level.
pub(crate) fn log_transport_failure(
    message: &str,
    request: &PreparedRequest,
    host: &Host,
    error: &reqwest::Error,
) {
    tracing::debug!(
        "{message} [{} {host}{}] {error}",
        request.method,
        request.path_and_query,
    );
    if tracing::enabled!(target: TRACER_TARGET, Level::TRACE) {
        tracing::trace!(target: TRACER_TARGET, "{}", curl_request(request, host));
    }
}

/// Renders a request as a replayable curl command line.
fn curl_request(request: &PreparedRequest, host: &Host) -> String {
    let mut line = format!(
        "curl -iX {} '{}{}'",
        request.method, host, request.path_and_query
    );
    if let Some(body) = &request.body {
        line.push_str(" -d '");
        line.push_str(&String::from_utf8_lossy(body));
        line.push('\'');
    }
    line
}

/// Renders a response as comment lines: status line, headers, a separator,
/// then the body with every line prefixed.
fn curl_response(response: &RawResponse) -> String {
    let mut out = format!("# {:?} {}", response.version, response.status);
    for (name, value) in &response.headers {
        out.push_str("\n# ");
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
    }
    out.push_str("\n#");
    if !response.body.is_empty() {
        for line in String::from_utf8_lossy(&response.body).lines() {
            out.push_str("\n# ");
            out.push_str(line);
        }
    }
    out
}
