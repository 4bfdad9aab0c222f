//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, cache headers, panic recovery,
//! authentication-header inspection.
//!
//! A middleware is any async function taking the request and a [`Next`]:
//!
//! ```rust,no_run
//! use arbor::{Request, Response, Router};
//! use arbor::middleware::{self, Next};
//!
//! async fn request_id(mut req: Request, next: Next) -> Response {
//!     req.headers_mut().insert("x-request-id", "42".parse().unwrap());
//!     next.run(req).await
//! }
//!
//! let app = Router::new()
//!     .middleware(middleware::trace)
//!     .middleware(request_id);
//! ```
//!
//! Middleware must be registered before the first route of a router. The
//! first one registered runs outermost; the innermost calls the router's
//! routing function, which in turn runs the matched handler.
//!
//! Built-in middleware:
//! - [`trace`]: a request span, then status and latency
//! - [`no_cache`]: strips conditional request headers, forbids caching
//! - [`recovery`]: turns a panicking handler into `500 Internal Server Error`

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

mod nocache;
mod recover;
mod trace;

pub use nocache::no_cache;
pub use recover::recovery;
pub use trace::trace;

/// Implemented for every `async fn(Request, Next) -> impl IntoResponse`.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of a router's middleware chain, ending in its routing function.
pub struct Next {
    router: Arc<Router>,
    index: usize,
}

impl Next {
    pub(crate) fn new(router: Arc<Router>) -> Self {
        Self { router, index: 0 }
    }

    /// Passes `req` to the next middleware, or to the router when none is left.
    pub async fn run(self, req: Request) -> Response {
        let current = self.router.middleware_at(self.index);
        match current {
            Some(mw) => {
                let next = Next { router: self.router, index: self.index + 1 };
                mw.call(req, next).await
            }
            None => self.router.route_http(req).await,
        }
    }
}
