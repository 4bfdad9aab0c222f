use std::time::Instant;

use tracing::{Instrument, info, info_span};

use super::Next;
use crate::request::Request;
use crate::response::Response;

/// Wraps the rest of the chain in a `request` span and logs the outcome.
///
/// Register it first so the span covers every other middleware.
pub async fn trace(req: Request, next: Next) -> Response {
    let span = info_span!("request", method = %req.method(), path = %req.path());
    let started = Instant::now();

    let response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status_code().as_u16(),
            latency_us = started.elapsed().as_micros() as u64,
            "request completed",
        );
    });
    response
}
