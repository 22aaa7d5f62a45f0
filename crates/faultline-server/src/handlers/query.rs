//! Read-only endpoints. Nothing here touches the tracker's contents.

use hyper::StatusCode;

use super::{HttpResponse, empty, json};
use crate::state::AppState;

/// Handles `GET /`.
pub fn index() -> HttpResponse {
    tracing::debug!("index called");
    empty(StatusCode::OK)
}

/// Handles `GET /dapr/subscribe`.
pub fn subscriptions(state: &AppState) -> HttpResponse {
    tracing::info!(
        count = state.config().subscriptions.len(),
        "announcing subscriptions"
    );
    json(StatusCode::OK, &state.config().subscriptions)
}

/// Handles `GET /tests/getCallCount`.
pub fn call_counts(state: &AppState) -> HttpResponse {
    let snapshot = state.engine().tracker().snapshot();
    tracing::info!(ids = snapshot.len(), "reporting call counts");
    for (id, attempts) in &snapshot {
        tracing::debug!(%id, attempts = attempts.len(), "call count");
    }
    json(StatusCode::OK, &snapshot)
}
