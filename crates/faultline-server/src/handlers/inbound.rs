//! Inbound shims: one per delivery mechanism, all routed through the engine.
//!
//! | Mechanism | Success | Failure |
//! |-----------|---------|---------|
//! | Direct invocation | 200, empty | 500 |
//! | Event delivery | 200, `{"status":"SUCCESS"}` | 500 |
//! | Input binding | 200 | 500 |
//!
//! Malformed payloads are answered with 400 before anything is recorded.

use std::fmt;

use faultline_core::{FailureDescription, Outcome};
use hyper::StatusCode;
use serde::Serialize;

use super::{HttpResponse, empty, error_response, json};
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Delivery mechanism an attempt arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Direct service invocation.
    Invocation,
    /// Pub/sub event delivery.
    Event,
    /// Input binding delivery.
    Binding,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invocation => "invocation",
            Self::Event => "event",
            Self::Binding => "binding",
        })
    }
}

/// Acknowledgment body understood by the sidecar's pub/sub delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventAck {
    /// Delivery status.
    pub status: &'static str,
    /// Free-form note.
    pub message: &'static str,
}

impl EventAck {
    /// Acknowledges a consumed event.
    pub const CONSUMED: Self = Self {
        status: "SUCCESS",
        message: "consumed",
    };
}

/// Handles `POST /resiliencyInvocation`.
pub async fn invocation(state: &AppState, body: &[u8]) -> HttpResponse {
    match FailureDescription::from_json(body) {
        Ok(description) => match attempt(state, Transport::Invocation, &description).await {
            Outcome::Success => empty(StatusCode::OK),
            Outcome::Failure => empty(StatusCode::INTERNAL_SERVER_ERROR),
        },
        Err(e) => error_response(&e.into()),
    }
}

/// Handles `POST /resiliencybinding`.
pub async fn binding(state: &AppState, body: &[u8]) -> HttpResponse {
    match FailureDescription::from_json(body) {
        Ok(description) => match attempt(state, Transport::Binding, &description).await {
            Outcome::Success => empty(StatusCode::OK),
            Outcome::Failure => empty(StatusCode::INTERNAL_SERVER_ERROR),
        },
        Err(e) => error_response(&e.into()),
    }
}

/// Handles `OPTIONS /resiliencybinding`, the sidecar's binding probe.
pub fn binding_probe() -> HttpResponse {
    tracing::info!("input binding probe accepted");
    empty(StatusCode::OK)
}

/// Handles a `POST` to a subscribed topic route.
pub async fn event(state: &AppState, body: &[u8]) -> HttpResponse {
    match description_from_envelope(body) {
        Ok(description) => match attempt(state, Transport::Event, &description).await {
            Outcome::Success => json(StatusCode::OK, &EventAck::CONSUMED),
            Outcome::Failure => empty(StatusCode::INTERNAL_SERVER_ERROR),
        },
        Err(e) => error_response(&e),
    }
}

/// Extracts the description carried in an event envelope's `data` object.
///
/// A missing or non-object `data` is rejected rather than defaulted.
///
/// # Errors
/// Returns a client error if the envelope or its payload is malformed.
pub fn description_from_envelope(body: &[u8]) -> Result<FailureDescription> {
    let envelope: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ServerError::malformed(format!("event envelope is not JSON: {e}")))?;
    let serde_json::Value::Object(mut envelope) = envelope else {
        return Err(ServerError::malformed("event envelope is not an object"));
    };
    match envelope.remove("data") {
        Some(data @ serde_json::Value::Object(_)) => Ok(FailureDescription::from_value(data)?),
        Some(_) => Err(ServerError::malformed("event `data` is not an object")),
        None => Err(ServerError::malformed("event envelope has no `data` field")),
    }
}

async fn attempt(
    state: &AppState,
    transport: Transport,
    description: &FailureDescription,
) -> Outcome {
    tracing::debug!(%transport, ?description, "attempt received");
    let verdict = state.engine().decide(description);
    let outcome = verdict.settle().await;
    tracing::info!(%transport, id = %description.id, ?outcome, "attempt answered");
    outcome
}
