use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::Next;
use crate::request::Request;
use crate::response::Response;

/// Catches a panic anywhere further down the chain and answers `500`.
///
/// The request's route context is released during unwinding like on any
/// other exit.
pub async fn recovery(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            error!(%method, %path, panic = panic_message(payload.as_ref()), "[recovered] handler panicked");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
