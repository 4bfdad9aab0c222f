//! # arbor
//!
//! A small HTTP framework built around a compressed radix-trie router.
//!
//! ## Routing
//!
//! Patterns are matched segment by segment, most specific edge first:
//!
//! | Pattern piece       | Matches                                        |
//! |---------------------|------------------------------------------------|
//! | `/users`            | the literal text                               |
//! | `{id:[0-9]+}`       | text up to the next delimiter, if the regex fully matches |
//! | `{id}`              | text up to the next delimiter, never across `/` |
//! | `*`                 | the rest of the path (last character only)     |
//!
//! A parameter ends at the character following its `}` in the pattern, so
//! `/{year}-{month}` splits `2024-05` into two captures. When a more specific
//! branch fails further down, the router backtracks and tries the next one.
//!
//! Routers compose: [`Router::mount`] and [`Router::group`] attach a whole
//! sub-router under a prefix. The sub-router matches only the remaining path,
//! and [`Request::route_pattern`] reports the combined pattern.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use arbor::{middleware, Request, Response, Router, Server};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .middleware(middleware::trace)
//!         .get("/", |_: Request| async { "hello" })
//!         .group("/api", |api| {
//!             api.get("/users/{id:[0-9]+}", get_user)
//!                .post("/users",            create_user)
//!         });
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or_default();
//!     Response::json(format!(r#"{{"id":{id}}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/api/users/99")
//!         .no_body()
//! }
//! ```

mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod tree;

pub mod middleware;

pub use context::{ContextPool, DEFAULT_MAX_IDLE, PooledContext, RouteContext, RouteParams};
pub use error::{Error, RouteError};
pub use handler::Handler;
pub use method::{Method, UnknownMethod};
pub use middleware::{Middleware, Next};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Match, Route, Router};
pub use server::Server;
