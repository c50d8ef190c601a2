//! HTTP method handling and request-line construction.
//!
//! Everything here is pure: the caller's method string is parsed once into a
//! [`Method`] variant, query parameters are appended to the endpoint in
//! insertion order, and the result is validated as a relative URI before any
//! connection is consulted.

use crate::{Error, Result};
use bytes::Bytes;
use std::fmt;
use url::form_urlencoded;

/// The HTTP verbs the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Parses a method name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Anything outside GET, HEAD, POST, PUT and DELETE is rejected with
    /// [`Error::UnsupportedMethod`].
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::UnsupportedMethod(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully prepared request: verb, path with encoded query, optional buffered
/// body. Cheap to clone and reissued as-is against successive hosts.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) path_and_query: String,
    pub(crate) body: Option<Bytes>,
}

impl PreparedRequest {
    /// Builds the request value, enforcing method/body compatibility.
    ///
    /// GET and DELETE may carry bodies (the transport permits it); HEAD must
    /// not. This check runs before any network activity.
    pub(crate) fn new(
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<Self> {
        if method == Method::Head && body.is_some() {
            return Err(Error::UnsupportedOperation(
                "HEAD with body is not supported".to_string(),
            ));
        }
        Ok(Self {
            method,
            path_and_query: build_path_and_query(endpoint, params)?,
            body,
        })
    }
}

/// Appends query parameters to `endpoint` in insertion order, percent-encoded,
/// and validates the result as a relative URI.
pub(crate) fn build_path_and_query(endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut out = String::from(endpoint);
    if !params.is_empty() {
        out.push(if endpoint.contains('?') { '&' } else { '?' });
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            query.append_pair(key, value);
        }
        out.push_str(&query.finish());
    }
    out.parse::<http::Uri>()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("get").unwrap(), Method::Get);
        assert_eq!(Method::parse("Post").unwrap(), Method::Post);
        assert_eq!(Method::parse("DELETE").unwrap(), Method::Delete);
    }

    #[test]
    fn method_parse_rejects_unknown_verbs() {
        for verb in ["PATCH", "OPTIONS", "TRACE", ""] {
            assert!(matches!(
                Method::parse(verb),
                Err(Error::UnsupportedMethod(_))
            ));
        }
    }

    #[test]
    fn params_are_appended_in_insertion_order() {
        let path =
            build_path_and_query("/index/_search", &[("q", "tree"), ("size", "10")]).unwrap();
        assert_eq!(path, "/index/_search?q=tree&size=10");
    }

    #[test]
    fn params_are_percent_encoded() {
        let path = build_path_and_query("/search", &[("q", "a b&c")]).unwrap();
        assert_eq!(path, "/search?q=a+b%26c");
    }

    #[test]
    fn existing_query_strings_are_extended() {
        let path = build_path_and_query("/search?pretty", &[("q", "x")]).unwrap();
        assert_eq!(path, "/search?pretty&q=x");
    }

    #[test]
    fn no_params_leaves_the_endpoint_untouched() {
        assert_eq!(build_path_and_query("/x", &[]).unwrap(), "/x");
    }

    #[test]
    fn invalid_endpoints_are_rejected() {
        assert!(matches!(
            build_path_and_query("/with space", &[]),
            Err(Error::InvalidUri(_))
        ));
        assert!(matches!(
            build_path_and_query("", &[]),
            Err(Error::InvalidUri(_))
        ));
    }

    #[test]
    fn head_with_body_is_refused() {
        let result = PreparedRequest::new(
            Method::Head,
            "/doc/1",
            &[],
            Some(Bytes::from_static(b"{}")),
        );
        assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
    }

    #[test]
    fn get_and_delete_may_carry_bodies() {
        for method in [Method::Get, Method::Delete, Method::Post, Method::Put] {
            let request =
                PreparedRequest::new(method, "/x", &[], Some(Bytes::from_static(b"{}"))).unwrap();
            assert!(request.body.is_some());
        }
    }
}
