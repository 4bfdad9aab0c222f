//! Minimal arbor example: a JSON API mounted under `/api`, static files
//! under `/static`, and custom fallbacks.
//!
//! Run with:
//!   RUST_LOG=arbor=trace,info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/api/users/42
//!   curl -i http://localhost:3000/api/users/alice      (404, id must be numeric)
//!   curl -i -X POST http://localhost:3000/api/users -d '{"name":"alice"}'
//!   curl -i -X PUT http://localhost:3000/api/users/42  (405 with Allow)
//!   curl -i http://localhost:3000/api/archive/2024-05
//!   curl -i http://localhost:3000/static/css/site.css

use arbor::{Request, Response, Router, Server, middleware};
use http::StatusCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Router::new()
        .middleware(middleware::trace)
        .middleware(middleware::recovery)
        .not_found(not_found)
        .get("/", |_: Request| async { "arbor demo" })
        .group("/api", |api| {
            api.middleware(middleware::no_cache)
                .get("/users/{id:[0-9]+}", get_user)
                .delete("/users/{id:[0-9]+}", delete_user)
                .post("/users", create_user)
                .get("/archive/{year}-{month}", archive)
        })
        .mount_handler("/static", serve_static);

    for route in app.routes() {
        tracing::info!(pattern = %route.pattern, methods = ?route.methods, any = route.any, "route");
    }

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /api/users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or_default();
    Response::json(format!(r#"{{"id":{id},"name":"alice"}}"#).into_bytes())
}

// POST /api/users
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/users/99")
        .json(br#"{"id":99}"#.to_vec())
}

// DELETE /api/users/{id}
async fn delete_user(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}

// GET /api/archive/{year}-{month}
async fn archive(req: Request) -> String {
    format!(
        "{} -> year={} month={}",
        req.route_pattern().unwrap_or_default(),
        req.param("year").unwrap_or_default(),
        req.param("month").unwrap_or_default(),
    )
}

// Everything under /static; the mount strips the prefix.
async fn serve_static(req: Request) -> String {
    let file = req.route_context().map(|c| c.route_path().to_owned()).unwrap_or_default();
    format!("would serve {file}")
}

async fn not_found(req: Request) -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text(format!("nothing at {}", req.path()))
}
