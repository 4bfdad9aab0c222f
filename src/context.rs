//! Per-request routing state and the pool it is recycled through.
//!
//! Every in-flight request owns exactly one [`RouteContext`], checked out of
//! a [`ContextPool`] when dispatch starts. The [`PooledContext`] guard travels
//! inside the [`Request`](crate::Request); when the request is dropped the
//! context is reset and handed back. Nothing a request captured is visible to
//! the next one.

use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::router::Router;

/// Idle contexts a pool keeps by default. Extra releases are dropped.
pub const DEFAULT_MAX_IDLE: usize = 1024;

// ── RouteParams ───────────────────────────────────────────────────────────────

/// Captured path parameters as parallel key / value lists, in trie descent order.
///
/// A catch-all capture is stored under the key `*`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteParams {
    pub(crate) keys: Vec<String>,
    pub(crate) values: Vec<String>,
}

impl RouteParams {
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.push(key.into());
        self.values.push(value.into());
    }

    /// Value of the most recent capture named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .rposition(|k| k == key)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().zip(&self.values).map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.keys.len() }
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    pub(crate) fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }
}

// ── RouteContext ──────────────────────────────────────────────────────────────

/// Routing scratch state for one request.
#[derive(Default)]
pub struct RouteContext {
    pub(crate) routes: Option<Arc<Router>>,

    /// Path the next router should match. Empty means "use the request URI".
    pub(crate) route_path: String,
    pub(crate) route_method: Option<Method>,

    pub(crate) url_params: RouteParams,
    /// Captures of the lookup in progress; merged into `url_params` on success.
    pub(crate) route_params: RouteParams,

    pub(crate) route_patterns: Vec<String>,

    pub(crate) methods_allowed: Vec<Method>,
    pub(crate) method_not_allowed: bool,

    // Fallbacks of the enclosing routers, for mounted routers without their own.
    pub(crate) inherited_not_found: Option<BoxedHandler>,
    pub(crate) inherited_not_allowed: Option<BoxedHandler>,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The top-level router dispatching this request.
    pub fn routes(&self) -> Option<&Arc<Router>> {
        self.routes.as_ref()
    }

    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    /// Overrides the path the router matches, e.g. from a rewriting middleware.
    pub fn set_route_path(&mut self, path: impl Into<String>) {
        self.route_path = path.into();
    }

    pub fn route_method(&self) -> Option<Method> {
        self.route_method
    }

    /// Overrides the method the router matches.
    pub fn set_route_method(&mut self, method: Method) {
        self.route_method = Some(method);
    }

    pub fn url_param(&self, key: &str) -> Option<&str> {
        self.url_params.get(key)
    }

    pub fn url_params(&self) -> &RouteParams {
        &self.url_params
    }

    /// Pattern fragments of every router the request passed through.
    pub fn route_patterns(&self) -> &[String] {
        &self.route_patterns
    }

    /// The full matched pattern, across mounts.
    ///
    /// `/api/*` followed by `/users/{id}` yields `/api/users/{id}`.
    pub fn route_pattern(&self) -> String {
        let mut pattern = self.route_patterns.concat();
        while pattern.contains("/*/") {
            pattern = pattern.replace("/*/", "/");
        }
        if pattern != "/" {
            if let Some(trimmed) = pattern.strip_suffix("//") {
                pattern.truncate(trimmed.len());
            }
            if let Some(trimmed) = pattern.strip_suffix('/') {
                pattern.truncate(trimmed.len());
            }
        }
        pattern
    }

    /// Methods registered at the path when the request's method was not.
    pub fn methods_allowed(&self) -> &[Method] {
        &self.methods_allowed
    }

    pub fn method_not_allowed(&self) -> bool {
        self.method_not_allowed
    }

    /// Clears every field. Allocations are kept for reuse.
    pub fn reset(&mut self) {
        self.routes = None;
        self.route_path.clear();
        self.route_method = None;
        self.url_params.clear();
        self.route_params.clear();
        self.route_patterns.clear();
        self.methods_allowed.clear();
        self.method_not_allowed = false;
        self.inherited_not_found = None;
        self.inherited_not_allowed = None;
    }

    pub(crate) fn commit_route_params(&mut self) {
        self.url_params.keys.append(&mut self.route_params.keys);
        self.url_params.values.append(&mut self.route_params.values);
    }

    pub(crate) fn allow(&mut self, method: Method) {
        if !self.methods_allowed.contains(&method) {
            self.methods_allowed.push(method);
        }
    }

    /// Path left for a mounted router: `/` plus the trailing wildcard capture.
    pub(crate) fn next_route_path(&self) -> String {
        match self.url_params.keys.last() {
            Some(key) if key == "*" => match self.url_params.values.last() {
                Some(rest) => format!("/{rest}"),
                None => "/".to_owned(),
            },
            _ => "/".to_owned(),
        }
    }

    /// Blanks the wildcard capture that linked a parent router to a mount.
    pub(crate) fn clear_wildcard(&mut self) {
        if self.url_params.keys.last().is_some_and(|k| k == "*") {
            if let Some(value) = self.url_params.values.last_mut() {
                value.clear();
            }
        }
    }
}

// ── Pool ──────────────────────────────────────────────────────────────────────

/// Thread-safe free list of [`RouteContext`]s.
pub struct ContextPool {
    free: Mutex<Vec<RouteContext>>,
    max_idle: usize,
}

impl ContextPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_IDLE)
    }

    /// A pool that keeps at most `max_idle` contexts between requests.
    pub fn with_capacity(max_idle: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_idle }
    }

    /// Checks out a clean context. It returns to the pool when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> PooledContext {
        let ctx = self.free.lock().pop().unwrap_or_default();
        PooledContext { ctx, pool: Arc::clone(self) }
    }

    /// Contexts currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut ctx: RouteContext) {
        ctx.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }
}

impl Default for ContextPool {
    fn default() -> Self { Self::new() }
}

/// A [`RouteContext`] checked out of a [`ContextPool`].
pub struct PooledContext {
    ctx: RouteContext,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = RouteContext;
    fn deref(&self) -> &RouteContext { &self.ctx }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut RouteContext { &mut self.ctx }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        self.pool.release(mem::take(&mut self.ctx));
    }
}
