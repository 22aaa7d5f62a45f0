//! Request handlers.
//!
//! Handlers take an already collected body so they stay independent of the
//! connection; [`crate::routes`] does the reading and dispatching.

pub mod inbound;
pub mod query;
pub mod triggers;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::ServerError;

/// Response type produced by every handler.
pub type HttpResponse = Response<Full<Bytes>>;

/// Response with a status and no body.
#[must_use]
pub fn empty(status: StatusCode) -> HttpResponse {
    with_body(status, Bytes::new(), None)
}

/// Response with a JSON body.
#[must_use]
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, Bytes::from(body), Some("application/json")),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response body");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Response with a raw body and optional content type.
#[must_use]
pub fn with_body(
    status: StatusCode,
    body: Bytes,
    content_type: Option<&'static str>,
) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// Turns an error into its status with the message as plain text.
#[must_use]
pub fn error_response(err: &ServerError) -> HttpResponse {
    let status = err.status();
    if err.is_client_error() {
        tracing::warn!(error = %err, "rejecting request");
    } else {
        tracing::error!(error = %err, "request failed");
    }
    with_body(
        status,
        Bytes::from(err.to_string()),
        Some("text/plain; charset=utf-8"),
    )
}
