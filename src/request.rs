//! Incoming HTTP request type.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Uri};

use crate::context::{PooledContext, RouteContext};

/// An incoming HTTP request with its body fully read.
///
/// Once the router has taken hold of it, the request also carries the
/// request's [`RouteContext`]: captured path parameters, the matched pattern,
/// and the methods allowed at the path.
pub struct Request {
    pub(crate) parts: Parts,
    pub(crate) body: Bytes,
    pub(crate) route: Option<PooledContext>,
}

impl Request {
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self { parts, body, route: None }
    }

    pub fn method(&self) -> &http::Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.route.as_deref()?.url_param(key)
    }

    /// Every captured path parameter, in match order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.route
            .as_deref()
            .into_iter()
            .flat_map(|ctx| ctx.url_params().iter())
    }

    /// The full route pattern that matched, e.g. `/api/users/{id}`.
    pub fn route_pattern(&self) -> Option<String> {
        self.route.as_deref().map(RouteContext::route_pattern)
    }

    pub fn route_context(&self) -> Option<&RouteContext> {
        self.route.as_deref()
    }

    pub fn route_context_mut(&mut self) -> Option<&mut RouteContext> {
        self.route.as_deref_mut()
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}
