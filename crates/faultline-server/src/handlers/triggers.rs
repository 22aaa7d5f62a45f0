//! Outbound test triggers.
//!
//! Each trigger validates the incoming description, forwards it through the
//! sidecar and reports the sidecar's verdict. No decision logic lives here.

use std::str::FromStr;

use bytes::Bytes;
use faultline_core::FailureDescription;
use hyper::StatusCode;

use super::{HttpResponse, empty, error_response, with_body};
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Protocol used to reach the peer app in `invokeService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain HTTP service invocation; the peer's status is relayed as is.
    Http,
    /// Invocation of the gRPC peer through the sidecar.
    Grpc,
    /// Native gRPC call to the peer through the sidecar's gRPC proxy.
    GrpcProxy,
}

impl FromStr for Protocol {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Self::Http),
            "grpc" => Ok(Self::Grpc),
            "grpc_proxy" => Ok(Self::GrpcProxy),
            other => Err(ServerError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Handles `POST /tests/invokeBinding/{binding}`.
pub async fn invoke_binding(state: &AppState, binding: &str, body: &[u8]) -> HttpResponse {
    tracing::info!(%binding, "invoking output binding");
    respond(forward_to_binding(state, binding, body).await)
}

async fn forward_to_binding(state: &AppState, binding: &str, body: &[u8]) -> Result<()> {
    let description = FailureDescription::from_json(body)?;
    state.sidecar().invoke_binding(binding, &description).await
}

/// Handles `POST /tests/publishMessage/{pubsub}/{topic}`.
pub async fn publish_message(
    state: &AppState,
    pubsub: &str,
    topic: &str,
    body: &[u8],
) -> HttpResponse {
    respond(forward_to_topic(state, pubsub, topic, body).await)
}

async fn forward_to_topic(
    state: &AppState,
    pubsub: &str,
    topic: &str,
    body: &[u8],
) -> Result<()> {
    let description = FailureDescription::from_json(body)?;
    tracing::info!(%pubsub, %topic, id = %description.id, "publishing message");
    state
        .sidecar()
        .publish_event(pubsub, topic, &description)
        .await
}

/// Handles `POST /tests/invokeService/{protocol}`.
///
/// The body is validated, then forwarded byte for byte (`http`, `grpc`) or
/// re-encoded into a gRPC request (`grpc_proxy`).
pub async fn invoke_service(state: &AppState, protocol: &str, body: Bytes) -> HttpResponse {
    tracing::info!(%protocol, "invoking peer service");
    match forward_to_peer(state, protocol, body).await {
        Ok(status) => empty(status),
        Err(e) => error_response(&e),
    }
}

async fn forward_to_peer(state: &AppState, protocol: &str, body: Bytes) -> Result<StatusCode> {
    let protocol = protocol.parse::<Protocol>()?;
    let description = FailureDescription::from_json(&body)?;
    let targets = &state.config().targets;
    match protocol {
        Protocol::Http => {
            let response = state
                .sidecar()
                .invoke_method(&targets.http_app_id, &targets.http_method, body)
                .await?;
            Ok(StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Protocol::Grpc => {
            let response = state
                .sidecar()
                .invoke_method(&targets.grpc_app_id, &targets.grpc_method, body)
                .await?;
            if response.is_success() {
                Ok(StatusCode::OK)
            } else {
                Err(ServerError::sidecar(format!(
                    "{} returned {}",
                    targets.grpc_app_id, response.status
                )))
            }
        }
        Protocol::GrpcProxy => {
            tracing::info!(id = %description.id, "proxying message");
            state
                .sidecar()
                .proxy_grpc(&targets.grpc_app_id, &description)
                .await?;
            Ok(StatusCode::OK)
        }
    }
}

/// Handles `GET /tests/getCallCountGRPC`: relays the gRPC peer's call counts.
pub async fn call_count_grpc(state: &AppState) -> HttpResponse {
    let targets = &state.config().targets;
    tracing::info!(app_id = %targets.grpc_app_id, "fetching peer call counts");
    let result = state
        .sidecar()
        .invoke_method(
            &targets.grpc_app_id,
            &targets.grpc_call_count_method,
            Bytes::new(),
        )
        .await;

    match result {
        Ok(response) if response.is_success() => {
            with_body(StatusCode::OK, response.body, Some("application/json"))
        }
        Ok(response) => error_response(&ServerError::sidecar(format!(
            "{} returned {}",
            targets.grpc_app_id, response.status
        ))),
        Err(e) => error_response(&e),
    }
}

fn respond(result: Result<()>) -> HttpResponse {
    match result {
        Ok(()) => empty(StatusCode::OK),
        Err(e) => error_response(&e),
    }
}
