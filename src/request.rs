//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::inject::{FromInjector, InjectError, Injector};

/// An incoming HTTP request with its body fully read.
///
/// Cheap to clone: the body is reference counted.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr,
        }
    }

    /// Starts a request by hand. Mostly useful in tests together with
    /// [`Service::handle`](crate::Service::handle).
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method,
                uri: uri.parse().unwrap_or_default(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
                params: HashMap::new(),
                remote_addr: None,
            },
        }
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> &str { self.uri.query().unwrap_or("") }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// All `name=value` pairs of every `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .collect()
    }

    /// Media type of the body without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.header("content-type")?;
        let essence = raw.split(';').next().unwrap_or(raw).trim();
        Some(essence.to_ascii_lowercase())
    }
}

impl FromInjector for Request {
    fn from_injector(injector: &Injector) -> Result<Self, InjectError> {
        injector.resolve()
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Invalid header names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.request.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.request.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_read_the_uri() {
        let req = Request::builder(Method::GET, "/hello?name=ada&x=1").build();
        assert_eq!(req.path(), "/hello");
        assert_eq!(req.query(), "name=ada&x=1");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::builder(Method::POST, "/")
            .header("Content-Type", "application/json; charset=utf-8")
            .build();
        assert_eq!(req.header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn cookies_split_on_semicolons() {
        let req = Request::builder(Method::GET, "/")
            .header("cookie", "a=1; b=two")
            .header("cookie", "c=3")
            .build();
        assert_eq!(req.cookies(), vec![("a", "1"), ("b", "two"), ("c", "3")]);
    }
}
