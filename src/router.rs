//! Trie-backed request router.
//!
//! A [`Router`] owns one routing trie, an append-only middleware chain, and
//! optional not-found / method-not-allowed handlers. Routers nest: a mounted
//! router hangs off a `/*` edge of its parent and only ever sees the part of
//! the path its parent left over.
//!
//! Build the tree once at startup; after that it is read-only and shared by
//! every connection.

use std::borrow::Cow;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::{debug, trace};

use crate::context::{ContextPool, RouteContext};
use crate::handler::{self, BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::tree::{MethodFilter, Node};

/// Outcome of resolving a method and path against a router.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Match {
    Found,
    NotFound,
    MethodNotAllowed,
}

/// One registered pattern, as reported by [`Router::routes`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub pattern: String,
    /// Methods registered explicitly under this pattern.
    pub methods: Vec<Method>,
    /// Registered for every method (via [`Router::any`] or a mount).
    pub any: bool,
    /// Routes of a router mounted here.
    pub sub_routes: Vec<Route>,
}

impl Route {
    pub(crate) fn new(pattern: String, any: bool) -> Self {
        Self { pattern, methods: Vec::new(), any, sub_routes: Vec::new() }
    }
}

/// The application router.
///
/// Each registration call returns `self` so routes chain naturally:
///
/// ```rust,no_run
/// # use arbor::{Request, Response, Router};
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// # async fn list_files(_: Request) -> Response { Response::text("") }
/// Router::new()
///     .get("/users/{id:[0-9]+}", get_user)
///     .post("/users",            create_user)
///     .get("/files/*",           list_files);
/// ```
pub struct Router {
    tree: Node,
    middlewares: Vec<BoxedMiddleware>,
    /// Set by the first route; the middleware chain is frozen from then on.
    sealed: bool,
    not_found: Option<BoxedHandler>,
    not_allowed: Option<BoxedHandler>,
    pool: Arc<ContextPool>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_pool(Arc::new(ContextPool::new()))
    }

    /// A router drawing route contexts from `pool`.
    pub fn with_pool(pool: Arc<ContextPool>) -> Self {
        Self {
            tree: Node::root(),
            middlewares: Vec::new(),
            sealed: false,
            not_found: None,
            not_allowed: None,
            pool,
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Appends a middleware to the chain.
    ///
    /// # Panics
    ///
    /// Panics if a route has already been registered on this router.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        if self.sealed {
            panic!("middlewares must be defined before routes are registered");
        }
        self.middlewares.push(Arc::new(mw));
        self
    }

    /// Handler for requests no route matches. Defaults to an empty `404`.
    ///
    /// Mounted routers without their own use this one.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(handler.into_boxed_handler());
        self
    }

    /// Handler for a matched path with an unregistered method.
    /// Defaults to `405` with an `Allow` header.
    ///
    /// Mounted routers without their own use this one.
    pub fn method_not_allowed(mut self, handler: impl Handler) -> Self {
        self.not_allowed = Some(handler.into_boxed_handler());
        self
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Register a handler for a method + pattern pair.
    ///
    /// Patterns start with `/` and may contain `{name}` parameters,
    /// `{name:regex}` constrained parameters, and a trailing `*`.
    ///
    /// # Panics
    ///
    /// Panics on a malformed pattern or when `method` is already registered
    /// under the same pattern.
    pub fn on(self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        self.add(MethodFilter::One(method), pattern, handler.into_boxed_handler())
    }

    /// Register a handler for every method at once.
    ///
    /// Methods registered explicitly on the same pattern keep their handlers.
    pub fn any(self, pattern: &str, handler: impl Handler) -> Self {
        self.add(MethodFilter::All, pattern, handler.into_boxed_handler())
    }

    /// Register a route written as `"METHOD /pattern"` or just `"/pattern"`
    /// (every method).
    ///
    /// # Panics
    ///
    /// Panics on an unknown method name.
    pub fn handle(self, route: &str, handler: impl Handler) -> Self {
        match route.split_once(' ') {
            Some((method, pattern)) => {
                let method = method.parse::<Method>().unwrap_or_else(|e| panic!("{e}"));
                self.on(method, pattern.trim_start(), handler)
            }
            None => self.any(route, handler),
        }
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Head, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, pattern, handler)
    }

    pub fn connect(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Connect, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Options, pattern, handler)
    }

    pub fn trace(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::Trace, pattern, handler)
    }

    fn add(mut self, filter: MethodFilter, pattern: &str, handler: BoxedHandler) -> Self {
        self.insert(filter, pattern, handler, false);
        debug!(method = %filter, pattern, "route registered");
        self
    }

    fn insert(&mut self, filter: MethodFilter, pattern: &str, handler: BoxedHandler, stub: bool) -> &mut Node {
        self.sealed = true;
        self.tree
            .insert(filter, pattern, handler, stub)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"))
    }

    // ── Mounting ──────────────────────────────────────────────────────────────

    /// Builds a child router with `build` and mounts it at `pattern`.
    ///
    /// ```rust,no_run
    /// # use arbor::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// Router::new().group("/api", |api| api.get("/users/{id}", get_user));
    /// ```
    pub fn group(self, pattern: &str, build: impl FnOnce(Router) -> Router) -> Self {
        let child = build(Router::with_pool(Arc::clone(&self.pool)));
        self.mount(pattern, child)
    }

    /// Attaches `router` under `pattern`. Requests below the mount point reach
    /// it with the prefix stripped.
    ///
    /// # Panics
    ///
    /// Panics if something is already mounted or wildcard-routed at `pattern`.
    pub fn mount(self, pattern: &str, router: Router) -> Self {
        let router = Arc::new(router);
        self.mount_at(pattern, Mounted::Router(Arc::clone(&router)), Some(router))
    }

    /// Attaches an arbitrary handler under `pattern`, as [`mount`](Self::mount)
    /// does for routers.
    pub fn mount_handler(self, pattern: &str, handler: impl Handler) -> Self {
        self.mount_at(pattern, Mounted::Handler(handler.into_boxed_handler()), None)
    }

    fn mount_at(mut self, pattern: &str, target: Mounted, subroutes: Option<Arc<Router>>) -> Self {
        let taken = self.tree.find_pattern(&format!("{pattern}*"))
            || self.tree.find_pattern(&format!("{pattern}/*"))
            || (!pattern.ends_with('/')
                && (self.tree.has_any_endpoint(pattern)
                    || self.tree.has_any_endpoint(&format!("{pattern}/"))));
        if taken {
            panic!("attempting to mount a handler on an existing path, `{pattern}`");
        }

        let handler: BoxedHandler = Arc::new(MountHandler { target });
        let mut base = pattern.to_owned();
        if !base.ends_with('/') {
            self.insert(MethodFilter::All, &base, Arc::clone(&handler), true);
            base.push('/');
            self.insert(MethodFilter::All, &base, Arc::clone(&handler), true);
        }
        base.push('*');

        let stub = subroutes.is_some();
        let node = self.insert(MethodFilter::All, &base, handler, stub);
        node.subroutes = subroutes;

        debug!(pattern, router = stub, "mounted");
        self
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Routes one request through the middleware chain to its handler.
    ///
    /// A fresh [`RouteContext`] is checked out of the pool unless the request
    /// already carries one (it was forwarded by a parent router). The context
    /// goes back to the pool when the request is dropped.
    pub async fn dispatch(self: &Arc<Self>, mut req: Request) -> Response {
        if req.route.is_none() {
            let mut ctx = self.pool.acquire();
            ctx.routes = Some(Arc::clone(self));
            req.route = Some(ctx);
        }
        Next::new(Arc::clone(self)).run(req).await
    }

    pub(crate) fn middleware_at(&self, index: usize) -> Option<BoxedMiddleware> {
        self.middlewares.get(index).cloned()
    }

    /// The routing function at the bottom of the middleware chain.
    pub(crate) async fn route_http(&self, mut req: Request) -> Response {
        let handler = self.resolve(&mut req);
        handler.call(req).await
    }

    fn resolve(&self, req: &mut Request) -> BoxedHandler {
        let Request { parts, route, .. } = req;
        let ctx = route.get_or_insert_with(|| self.pool.acquire());

        let not_found = self.not_found.clone().or_else(|| ctx.inherited_not_found.clone());
        let not_allowed = self.not_allowed.clone().or_else(|| ctx.inherited_not_allowed.clone());

        let path = if ctx.route_path.is_empty() {
            routing_path(parts.uri.path()).into_owned()
        } else {
            ctx.route_path.clone()
        };

        let method = match ctx.route_method {
            Some(method) => method,
            None => match Method::try_from(&parts.method) {
                Ok(method) => {
                    ctx.route_method = Some(method);
                    method
                }
                Err(e) => {
                    trace!(%path, "{e}");
                    return not_allowed.unwrap_or_else(handler::default_not_allowed);
                }
            },
        };

        match self.tree.find_route(ctx, method, &path) {
            Some((_, endpoint)) => {
                trace!(%method, %path, pattern = %endpoint.pattern, "route matched");
                let handler = Arc::clone(&endpoint.handler);
                ctx.inherited_not_found = not_found;
                ctx.inherited_not_allowed = not_allowed;
                handler
            }
            None if ctx.method_not_allowed => {
                trace!(%method, %path, "method not allowed");
                not_allowed.unwrap_or_else(handler::default_not_allowed)
            }
            None => {
                trace!(%method, %path, "no route");
                not_found.unwrap_or_else(handler::default_not_found)
            }
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Every registered route, mounts included, in match order.
    pub fn routes(&self) -> Vec<Route> {
        self.tree.routes()
    }

    /// Resolves `method` + `path` without running anything, descending into
    /// mounted routers. Captures and the pattern trail land on `ctx`.
    pub fn lookup(&self, ctx: &mut RouteContext, method: Method, path: &str) -> Match {
        match self.tree.find_route(ctx, method, path) {
            Some((node, _)) => match &node.subroutes {
                Some(sub) => {
                    let rest = ctx.next_route_path();
                    ctx.clear_wildcard();
                    ctx.route_path.clone_from(&rest);
                    sub.lookup(ctx, method, &rest)
                }
                None => Match::Found,
            },
            None if ctx.method_not_allowed => Match::MethodNotAllowed,
            None => Match::NotFound,
        }
    }

    /// The full pattern `method` + `path` resolves to, across mounts.
    pub fn find(&self, ctx: &mut RouteContext, method: Method, path: &str) -> Option<String> {
        let (node, endpoint) = self.tree.find_route(ctx, method, path)?;
        let Some(sub) = &node.subroutes else {
            return Some(endpoint.pattern.clone());
        };

        let rest = ctx.next_route_path();
        ctx.clear_wildcard();
        ctx.route_path.clone_from(&rest);
        let inner = sub.find(ctx, method, &rest)?;
        let outer = endpoint.pattern.strip_suffix("/*").unwrap_or(&endpoint.pattern);
        Some(format!("{outer}{inner}"))
    }

    /// Methods that resolve to a handler at `path`, for an `Allow` header.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|&m| self.lookup(&mut RouteContext::new(), m, path) == Match::Found)
            .collect()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// The path a request is routed on: percent-decoded, unless decoding would
/// turn an escaped `%2F` into a separator or produce invalid UTF-8.
fn routing_path(raw: &str) -> Cow<'_, str> {
    if raw.is_empty() {
        return Cow::Borrowed("/");
    }
    if raw.contains("%2F") || raw.contains("%2f") {
        return Cow::Borrowed(raw);
    }
    percent_decode_str(raw).decode_utf8().unwrap_or(Cow::Borrowed(raw))
}

// ── Mount plumbing ────────────────────────────────────────────────────────────

enum Mounted {
    Router(Arc<Router>),
    Handler(BoxedHandler),
}

/// Endpoint at a mount point: strips the consumed prefix, then delegates.
struct MountHandler {
    target: Mounted,
}

impl ErasedHandler for MountHandler {
    fn call(&self, mut req: Request) -> BoxFuture {
        if let Some(ctx) = req.route_context_mut() {
            ctx.route_path = ctx.next_route_path();
            ctx.clear_wildcard();
        }
        match &self.target {
            Mounted::Router(router) => {
                let router = Arc::clone(router);
                Box::pin(async move { router.dispatch(req).await })
            }
            Mounted::Handler(handler) => handler.call(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    fn request(method: &str, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    async fn echo_pattern(req: Request) -> String {
        let params: Vec<String> = req.params().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{} {}", req.route_pattern().unwrap_or_default(), params.join("&"))
    }

    fn body(res: &Response) -> &str {
        std::str::from_utf8(res.body()).unwrap()
    }

    #[tokio::test]
    async fn mounted_group_sees_stripped_path() {
        let app = Arc::new(Router::new().group("/api", |api| api.get("/users/{id}", echo_pattern)));
        let res = app.dispatch(request("GET", "/api/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(body(&res), "/api/users/{id} *=&id=42");
    }

    #[tokio::test]
    async fn nested_mounts_rebuild_the_full_pattern() {
        let v1 = Router::new().get("/items/{item}", echo_pattern);
        let api = Router::new().mount("/v1", v1);
        let app = Arc::new(Router::new().mount("/api", api));
        let res = app.dispatch(request("GET", "/api/v1/items/7")).await;
        assert_eq!(body(&res), "/api/v1/items/{item} *=&*=&item=7");
    }

    #[tokio::test]
    async fn method_miss_answers_405_with_allow() {
        let app = Arc::new(
            Router::new()
                .get("/things", |_: Request| async { "" })
                .put("/things", |_: Request| async { "" }),
        );
        let res = app.dispatch(request("DELETE", "/things")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, PUT"));
    }

    #[tokio::test]
    async fn unknown_method_is_not_allowed() {
        let app = Arc::new(Router::new().get("/", |_: Request| async { "" }));
        let res = app.dispatch(request("BREW", "/")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn mounted_router_inherits_fallbacks() {
        async fn teapot(_: Request) -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }
        // Fallback set after the mount still reaches the child.
        let app = Arc::new(
            Router::new()
                .group("/api", |api| api.get("/ok", |_: Request| async { "" }))
                .not_found(teapot),
        );
        let res = app.dispatch(request("GET", "/api/missing")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn child_fallback_overrides_parent() {
        let app = Arc::new(
            Router::new()
                .not_found(|_: Request| async { StatusCode::IM_A_TEAPOT })
                .group("/api", |api| {
                    api.not_found(|_: Request| async { StatusCode::GONE })
                        .get("/ok", |_: Request| async { "" })
                }),
        );
        let res = app.dispatch(request("GET", "/api/missing")).await;
        assert_eq!(res.status_code(), StatusCode::GONE);
        let res = app.dispatch(request("GET", "/elsewhere")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn mount_handler_receives_remaining_path() {
        let app = Arc::new(Router::new().mount_handler("/static", |req: Request| async move {
            req.route_context().map(|c| c.route_path().to_owned()).unwrap_or_default()
        }));
        let res = app.dispatch(request("GET", "/static/css/site.css")).await;
        assert_eq!(body(&res), "/css/site.css");
        let res = app.dispatch(request("GET", "/static")).await;
        assert_eq!(body(&res), "/");
    }

    #[tokio::test]
    async fn handle_parses_method_prefix() {
        let app = Arc::new(
            Router::new()
                .handle("POST /submit", |_: Request| async { StatusCode::CREATED })
                .handle("/anything", |_: Request| async { "any" }),
        );
        let res = app.dispatch(request("POST", "/submit")).await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let res = app.dispatch(request("GET", "/submit")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        let res = app.dispatch(request("PATCH", "/anything")).await;
        assert_eq!(body(&res), "any");
    }

    #[tokio::test]
    async fn contexts_return_to_the_pool() {
        let pool = Arc::new(ContextPool::new());
        let app = Arc::new(Router::with_pool(Arc::clone(&pool)).get("/u/{id}", echo_pattern));
        app.dispatch(request("GET", "/u/1")).await;
        assert_eq!(pool.idle(), 1);

        let res = app.dispatch(request("GET", "/u/2")).await;
        assert_eq!(body(&res), "/u/{id} id=2");
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    #[should_panic(expected = "middlewares must be defined before routes")]
    fn middleware_after_route_panics() {
        async fn noop(req: Request, next: Next) -> Response {
            next.run(req).await
        }
        let _ = Router::new().get("/", |_: Request| async { "" }).middleware(noop);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_route_panics() {
        let _ = Router::new()
            .get("/a/{x}", |_: Request| async { "1" })
            .get("/a/{y}", |_: Request| async { "2" });
    }

    #[test]
    #[should_panic(expected = "must begin with '/'")]
    fn pattern_without_slash_panics() {
        let _ = Router::new().get("users", |_: Request| async { "" });
    }

    #[test]
    #[should_panic(expected = "existing path")]
    fn mount_over_wildcard_panics() {
        let _ = Router::new()
            .get("/api/*", |_: Request| async { "" })
            .mount("/api", Router::new());
    }

    #[test]
    #[should_panic(expected = "existing path")]
    fn mount_over_any_route_names_the_mount() {
        let _ = Router::new()
            .any("/api", |_: Request| async { "" })
            .mount("/api", Router::new());
    }

    #[test]
    fn routing_path_decodes_all_but_slashes() {
        assert_eq!(routing_path(""), "/");
        assert_eq!(routing_path("/users/caf%C3%A9"), "/users/café");
        assert_eq!(routing_path("/hello%20world"), "/hello world");
        assert_eq!(routing_path("/files/a%2Fb%20c"), "/files/a%2Fb%20c");
        assert_eq!(routing_path("/bad/%FF"), "/bad/%FF");
    }

    #[test]
    fn lookup_find_and_allowed_methods_cross_mounts() {
        let app = Router::new()
            .get("/", |_: Request| async { "" })
            .group("/api", |api| {
                api.get("/users/{id}", |_: Request| async { "" })
                    .delete("/users/{id}", |_: Request| async { "" })
            });

        let mut ctx = RouteContext::new();
        assert_eq!(app.lookup(&mut ctx, Method::Get, "/api/users/9"), Match::Found);
        assert_eq!(ctx.url_param("id"), Some("9"));
        assert_eq!(ctx.route_pattern(), "/api/users/{id}");

        let mut ctx = RouteContext::new();
        assert_eq!(app.lookup(&mut ctx, Method::Post, "/api/users/9"), Match::MethodNotAllowed);
        assert_eq!(ctx.methods_allowed(), [Method::Delete, Method::Get]);

        let mut ctx = RouteContext::new();
        assert_eq!(app.lookup(&mut ctx, Method::Get, "/nope"), Match::NotFound);

        let mut ctx = RouteContext::new();
        assert_eq!(
            app.find(&mut ctx, Method::Get, "/api/users/9").as_deref(),
            Some("/api/users/{id}")
        );

        assert_eq!(app.allowed_methods("/api/users/9"), [Method::Delete, Method::Get]);
        assert_eq!(app.allowed_methods("/"), [Method::Get]);
    }

    #[test]
    fn routes_report_mounts_with_their_children() {
        let app = Router::new()
            .get("/health", |_: Request| async { "" })
            .group("/api", |api| api.post("/users", |_: Request| async { "" }));
        let routes = app.routes();

        let patterns: Vec<_> = routes.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, ["/api/*", "/health"]);

        let api = &routes[0];
        assert!(api.any);
        assert_eq!(api.sub_routes.len(), 1);
        assert_eq!(api.sub_routes[0].pattern, "/users");
        assert_eq!(api.sub_routes[0].methods, [Method::Post]);
    }
}
