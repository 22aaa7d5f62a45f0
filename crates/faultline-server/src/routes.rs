//! Route table and request dispatch.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Incoming};
use hyper::{Method, Request, StatusCode};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::error::ServerError;
use crate::handlers::{self, HttpResponse, inbound, query, triggers};
use crate::state::AppState;

/// Largest request body the harness reads; anything longer is rejected.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A resolved route, borrowing its path parameters from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `GET /`
    Index,
    /// `GET /dapr/subscribe`
    Subscribe,
    /// `POST /resiliencyInvocation`
    Invocation,
    /// `POST /resiliencybinding`
    Binding,
    /// `OPTIONS /resiliencybinding`
    BindingProbe,
    /// `POST` to a subscribed topic route.
    Event,
    /// `GET /tests/getCallCount`
    CallCount,
    /// `GET /tests/getCallCountGRPC`
    CallCountGrpc,
    /// `POST /tests/invokeBinding/{binding}`
    InvokeBinding(&'a str),
    /// `POST /tests/publishMessage/{pubsub}/{topic}`
    PublishMessage(&'a str, &'a str),
    /// `POST /tests/invokeService/{protocol}`
    InvokeService(&'a str),
    /// Known path, wrong method.
    MethodNotAllowed,
    /// Unknown path.
    NotFound,
}

impl<'a> Route<'a> {
    /// Resolves a method and path against the route table.
    ///
    /// One trailing slash is ignored.
    #[must_use]
    pub fn resolve(method: &Method, path: &'a str, config: &HarnessConfig) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments: Vec<&'a str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let get = *method == Method::GET;
        let post = *method == Method::POST;
        let only = |allowed: bool, route: Self| {
            if allowed {
                route
            } else {
                Self::MethodNotAllowed
            }
        };

        match segments[..] {
            [] => only(get, Self::Index),
            ["dapr", "subscribe"] => only(get, Self::Subscribe),
            ["resiliencyInvocation"] => only(post, Self::Invocation),
            ["resiliencybinding"] if post => Self::Binding,
            ["resiliencybinding"] if *method == Method::OPTIONS => Self::BindingProbe,
            ["resiliencybinding"] => Self::MethodNotAllowed,
            ["tests", "getCallCount"] => only(get, Self::CallCount),
            ["tests", "getCallCountGRPC"] => only(get, Self::CallCountGrpc),
            ["tests", "invokeBinding", binding] => only(post, Self::InvokeBinding(binding)),
            ["tests", "publishMessage", pubsub, topic] => {
                only(post, Self::PublishMessage(pubsub, topic))
            }
            ["tests", "invokeService", protocol] => only(post, Self::InvokeService(protocol)),
            _ if config.subscription_for(trimmed).is_some() => only(post, Self::Event),
            _ => Self::NotFound,
        }
    }

    /// Returns true if the handler needs the request body.
    #[must_use]
    pub const fn reads_body(&self) -> bool {
        matches!(
            self,
            Self::Invocation
                | Self::Binding
                | Self::Event
                | Self::InvokeBinding(_)
                | Self::PublishMessage(..)
                | Self::InvokeService(_)
        )
    }
}

/// Entry point for every request on every connection.
pub async fn dispatch(
    state: Arc<AppState>,
    request: Request<Incoming>,
) -> Result<HttpResponse, Infallible> {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = tracing::info_span!("request", %request_id, %method, %path);

    async move {
        let route = Route::resolve(&method, &path, state.config());
        let body = if route.reads_body() {
            match read_body(request.into_body()).await {
                Ok(body) => body,
                Err(e) => return Ok(handlers::error_response(&e)),
            }
        } else {
            Bytes::new()
        };

        let response = handle(&state, route, body).await;
        tracing::debug!(status = %response.status(), "responding");
        Ok(response)
    }
    .instrument(span)
    .await
}

/// Collects a request body of at most [`MAX_BODY_BYTES`].
async fn read_body<B>(body: B) -> Result<Bytes, ServerError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ServerError::malformed(format!("failed to read body: {e}")))
}

/// Runs the handler for a resolved route.
pub async fn handle(state: &AppState, route: Route<'_>, body: Bytes) -> HttpResponse {
    match route {
        Route::Index => query::index(),
        Route::Subscribe => query::subscriptions(state),
        Route::Invocation => inbound::invocation(state, &body).await,
        Route::Binding => inbound::binding(state, &body).await,
        Route::BindingProbe => inbound::binding_probe(),
        Route::Event => inbound::event(state, &body).await,
        Route::CallCount => query::call_counts(state),
        Route::CallCountGrpc => triggers::call_count_grpc(state).await,
        Route::InvokeBinding(binding) => triggers::invoke_binding(state, binding, &body).await,
        Route::PublishMessage(pubsub, topic) => {
            triggers::publish_message(state, pubsub, topic, &body).await
        }
        Route::InvokeService(protocol) => triggers::invoke_service(state, protocol, body).await,
        Route::MethodNotAllowed => handlers::empty(StatusCode::METHOD_NOT_ALLOWED),
        Route::NotFound => handlers::empty(StatusCode::NOT_FOUND),
    }
}
