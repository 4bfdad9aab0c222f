//! Handler trait, type erasure, and the built-in fallbacks.
//!
//! Trie nodes hold handlers of many concrete types, so each one is erased to
//! a [`BoxedHandler`] at registration. Mount points, fallbacks and user
//! routes all share that one representation.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use http::StatusCode;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe call interface behind [`BoxedHandler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything callable as `async fn(Request) -> impl IntoResponse`.
///
/// Sealed; closures and `async fn` items get it from the blanket impl.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Fallbacks ─────────────────────────────────────────────────────────────────

static NOT_FOUND: LazyLock<BoxedHandler> = LazyLock::new(|| not_found.into_boxed_handler());
static NOT_ALLOWED: LazyLock<BoxedHandler> =
    LazyLock::new(|| method_not_allowed.into_boxed_handler());

/// Handler used when no route matches and the router has no custom one.
pub(crate) fn default_not_found() -> BoxedHandler {
    Arc::clone(&NOT_FOUND)
}

/// Handler used when the path matched but the method did not.
pub(crate) fn default_not_allowed() -> BoxedHandler {
    Arc::clone(&NOT_ALLOWED)
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

/// `405` with an `Allow` header listing what the path does accept.
async fn method_not_allowed(req: Request) -> Response {
    let allow = req
        .route_context()
        .map(|ctx| {
            ctx.methods_allowed()
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let builder = Response::builder().status(StatusCode::METHOD_NOT_ALLOWED);
    if allow.is_empty() {
        builder.no_body()
    } else {
        builder.header("allow", &allow).no_body()
    }
}
