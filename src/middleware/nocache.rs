use http::header;

use super::Next;
use crate::request::Request;
use crate::response::Response;

const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 UTC";

const CACHE_CONTROL: &str = "no-cache, no-store, no-transform, must-revalidate, private, max-age=0";

/// Request headers that would let an upstream answer `304 Not Modified`.
const VALIDATORS: [header::HeaderName; 6] = [
    header::ETAG,
    header::IF_MODIFIED_SINCE,
    header::IF_MATCH,
    header::IF_NONE_MATCH,
    header::IF_RANGE,
    header::IF_UNMODIFIED_SINCE,
];

/// Forbids clients and proxies from caching the response.
pub async fn no_cache(mut req: Request, next: Next) -> Response {
    for name in &VALIDATORS {
        req.headers_mut().remove(name);
    }

    let mut response = next.run(req).await;
    response.set_header("expires", EPOCH);
    response.set_header("cache-control", CACHE_CONTROL);
    response.set_header("pragma", "no-cache");
    response.set_header("x-accel-expires", "0");
    response
}
