use std::collections::HashSet;
use std::sync::Arc;

use arbor::{ContextPool, Match, Method, Request, Response, RouteContext, Router};
use bytes::Bytes;
use http::StatusCode;
use proptest::prelude::*;
use tracing_subscriber::EnvFilter;

fn request(method: &str, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .unwrap()
        .into()
}

fn text(res: &Response) -> String {
    String::from_utf8_lossy(res.body()).into_owned()
}

fn named(name: &'static str) -> impl Fn(Request) -> std::future::Ready<&'static str> + Clone {
    move |_| std::future::ready(name)
}

/// `RUST_LOG=arbor=trace cargo test` shows the routing decisions.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn get(app: &Arc<Router>, path: &str) -> Response {
    init_tracing();
    app.dispatch(request("GET", path)).await
}

#[tokio::test]
async fn static_edge_beats_param() {
    let app = Arc::new(
        Router::new()
            .get("/a/{x}", named("param"))
            .get("/a/static", named("static")),
    );
    assert_eq!(text(&get(&app, "/a/static").await), "static");
    assert_eq!(text(&get(&app, "/a/other").await), "param");
}

#[tokio::test]
async fn regex_edge_beats_plain_param() {
    let app = Arc::new(
        Router::new()
            .get("/a/{y}", named("plain"))
            .get(r"/a/{x:\d+}", named("digits")),
    );
    assert_eq!(text(&get(&app, "/a/123").await), "digits");
    assert_eq!(text(&get(&app, "/a/abc").await), "plain");
}

#[tokio::test]
async fn regex_siblings_resolve_in_registration_order() {
    let app = Arc::new(
        Router::new()
            .get("/v/{n:[0-9]+}", named("numeric"))
            .get("/v/{h:[0-9a-f]+}", named("hex")),
    );
    // "123" satisfies both; the first registered wins.
    assert_eq!(text(&get(&app, "/v/123").await), "numeric");
    assert_eq!(text(&get(&app, "/v/beef").await), "hex");
}

#[tokio::test]
async fn wildcard_captures_the_rest_without_shadowing() {
    let app = Arc::new(
        Router::new()
            .get("/files/*", |req: Request| async move {
                format!("wild {}", req.param("*").unwrap_or_default())
            })
            .get("/files/sub/{id}", |req: Request| async move {
                format!("id {}", req.param("id").unwrap_or_default())
            }),
    );
    assert_eq!(text(&get(&app, "/files/sub/dir/name.txt").await), "wild sub/dir/name.txt");
    assert_eq!(text(&get(&app, "/files/sub/7").await), "id 7");
}

#[tokio::test]
async fn backtracks_out_of_a_dead_end_branch() {
    let app = Arc::new(
        Router::new()
            .get("/users/new/edit", named("edit"))
            .get("/users/new/view", named("view"))
            .get("/users/{id}/posts", named("param")),
    );
    assert_eq!(text(&get(&app, "/users/new/posts").await), "param");
    assert_eq!(text(&get(&app, "/users/new/view").await), "view");
}

#[tokio::test]
async fn params_split_on_the_following_delimiter() {
    let app = Arc::new(Router::new().get("/archive/{year}-{month}.{fmt}", |req: Request| async move {
        let p = |k: &str| req.param(k).unwrap_or_default().to_owned();
        format!("{} {} {}", p("year"), p("month"), p("fmt"))
    }));
    assert_eq!(text(&get(&app, "/archive/2024-05.json").await), "2024 05 json");
}

#[tokio::test]
async fn percent_encoded_paths_are_decoded_before_matching() {
    let app = Arc::new(
        Router::new()
            .get("/users/{name}", |req: Request| async move {
                req.param("name").unwrap_or_default().to_owned()
            })
            .get("/hello world", named("spaced")),
    );
    assert_eq!(text(&get(&app, "/users/caf%C3%A9").await), "café");
    assert_eq!(text(&get(&app, "/hello%20world").await), "spaced");

    // An escaped slash keeps the whole path encoded, so it stays one segment.
    assert_eq!(text(&get(&app, "/users/a%2Fb").await), "a%2Fb");
}

#[tokio::test]
async fn method_not_allowed_lists_exactly_the_registered_methods() {
    let app = Arc::new(
        Router::new()
            .post("/items/{id}", named("post"))
            .delete("/items/{id}", named("delete"))
            .get("/items", named("list")),
    );
    init_tracing();
    let res = app.dispatch(request("PATCH", "/items/3")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("DELETE, POST"));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = Arc::new(Router::new().get("/known", named("known")));
    let res = get(&app, "/unknown").await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn mounted_group_rebuilds_pattern_and_params() {
    let app = Arc::new(Router::new().group("/api", |api| {
        api.get("/users/{id}", |req: Request| async move {
            format!(
                "{} id={}",
                req.route_pattern().unwrap_or_default(),
                req.param("id").unwrap_or_default()
            )
        })
    }));
    assert_eq!(text(&get(&app, "/api/users/42").await), "/api/users/{id} id=42");
}

#[tokio::test]
async fn mount_point_itself_reaches_the_sub_router_root() {
    let app = Arc::new(Router::new().group("/api", |api| api.get("/", named("api root"))));
    assert_eq!(text(&get(&app, "/api").await), "api root");
    assert_eq!(text(&get(&app, "/api/").await), "api root");
}

#[tokio::test]
async fn sub_router_method_miss_is_405_not_404() {
    let app = Arc::new(Router::new().group("/api", |api| api.get("/users", named("list"))));
    let res = app.dispatch(request("POST", "/api/users")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("GET"));
}

#[tokio::test]
async fn contexts_do_not_leak_between_requests() {
    let pool = Arc::new(ContextPool::with_capacity(1));
    let app = Arc::new(
        Router::with_pool(Arc::clone(&pool))
            .get("/u/{id}", named("user"))
            .get("/plain", |req: Request| async move {
                let ctx = req.route_context().unwrap();
                format!("{} {}", ctx.url_params().len(), ctx.route_patterns().len())
            }),
    );
    get(&app, "/u/1").await;
    assert_eq!(pool.idle(), 1);
    assert_eq!(text(&get(&app, "/plain").await), "0 1");
}

#[test]
fn lookup_reports_all_three_outcomes() {
    let app = Router::new().put("/p/{id}", named("put"));
    assert_eq!(app.lookup(&mut RouteContext::new(), Method::Put, "/p/1"), Match::Found);
    assert_eq!(app.lookup(&mut RouteContext::new(), Method::Get, "/p/1"), Match::MethodNotAllowed);
    assert_eq!(app.lookup(&mut RouteContext::new(), Method::Put, "/q/1"), Match::NotFound);
}

// ── Property: every route resolves to itself ──────────────────────────────────

/// `None` is a parameter segment.
fn shape() -> impl Strategy<Value = Vec<Option<String>>> {
    prop::collection::vec(prop_oneof!["[a-z]{1,5}".prop_map(Some), Just(None)], 1..5)
}

fn to_pattern(shape: &[Option<String>]) -> String {
    shape
        .iter()
        .enumerate()
        .map(|(i, seg)| match seg {
            Some(lit) => format!("/{lit}"),
            None => format!("/{{p{i}}}"),
        })
        .collect()
}

fn to_path(shape: &[Option<String>], token: &str) -> String {
    shape
        .iter()
        .map(|seg| format!("/{}", seg.as_deref().unwrap_or(token)))
        .collect()
}

proptest! {
    // Tokens start with a digit, so they never collide with a literal segment.
    #[test]
    fn every_route_matches_its_concrete_paths(
        shapes in prop::collection::vec(shape(), 1..12),
        token in "[0-9][a-z0-9]{0,6}",
    ) {
        let mut seen = HashSet::new();
        let shapes: Vec<_> = shapes.into_iter().filter(|s| seen.insert(s.clone())).collect();

        let app = shapes.iter().fold(Router::new(), |app, shape| {
            app.get(&to_pattern(shape), named("hit"))
        });

        for shape in &shapes {
            let pattern = to_pattern(shape);
            let path = to_path(shape, &token);

            let mut ctx = RouteContext::new();
            prop_assert_eq!(app.find(&mut ctx, Method::Get, &path), Some(pattern.clone()));
            for (i, seg) in shape.iter().enumerate() {
                if seg.is_none() {
                    prop_assert_eq!(ctx.url_param(&format!("p{i}")), Some(token.as_str()));
                }
            }

            let mut ctx = RouteContext::new();
            prop_assert_eq!(app.lookup(&mut ctx, Method::Post, &path), Match::MethodNotAllowed);
            prop_assert_eq!(ctx.methods_allowed(), &[Method::Get][..]);
        }
    }
}
