//! Outbound client for the sidecar under test.
//!
//! The harness only forwards through this client. It never retries a failed
//! call: retrying is the sidecar's job, and doing it here would blur what the
//! test runner observes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use faultline_core::{FailureDescription, FaultError};
use serde::Serialize;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};

use crate::config::SidecarConfig;
use crate::error::{Result, ServerError};

/// Response relayed from a peer method invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResponse {
    /// HTTP status returned by the sidecar.
    pub status: u16,
    /// Raw response body.
    pub body: Bytes,
}

impl MethodResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Operations the test-trigger endpoints need from the sidecar.
#[async_trait]
pub trait Sidecar: Send + Sync {
    /// Sends the description to an output binding with operation `create`.
    async fn invoke_binding(&self, binding: &str, description: &FailureDescription) -> Result<()>;

    /// Publishes the description to `pubsub`/`topic`.
    async fn publish_event(
        &self,
        pubsub: &str,
        topic: &str,
        description: &FailureDescription,
    ) -> Result<()>;

    /// Invokes `method` on `app_id` and returns whatever came back.
    async fn invoke_method(
        &self,
        app_id: &str,
        method: &str,
        body: Bytes,
    ) -> Result<MethodResponse>;

    /// Calls `Greeter.SayHello` on `app_id` through the sidecar's gRPC proxy,
    /// carrying the description as JSON in the request name.
    async fn proxy_grpc(&self, app_id: &str, description: &FailureDescription) -> Result<()>;

    /// Checks that the sidecar is ready to route outbound calls.
    async fn probe(&self) -> Result<()>;
}

/// gRPC method proxied to the peer app.
pub const GREETER_SAY_HELLO: &str = "/helloworld.Greeter/SayHello";

/// Metadata key the sidecar's gRPC proxy routes on.
pub const APP_ID_METADATA: &str = "dapr-app-id";

/// `helloworld.HelloRequest`.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloRequest {
    /// Free-form payload; carries the JSON description.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// `helloworld.HelloReply`.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloReply {
    /// Greeting returned by the peer.
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Serialize)]
struct BindingRequest<'a> {
    data: &'a FailureDescription,
    operation: &'static str,
}

/// Sidecar client speaking the Dapr HTTP API (v1.0).
#[derive(Debug, Clone)]
///
/// Calls to the gRPC peer go through the sidecar's gRPC port on a channel
/// opened on first use and dropped after a transport failure.
pub struct DaprHttpSidecar {
    client: reqwest::Client,
    grpc_channel: Arc<tokio::sync::Mutex<Option<Channel>>>,
    config: SidecarConfig,
}

impl DaprHttpSidecar {
    /// Builds a client without contacting the sidecar.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SidecarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            grpc_channel: Arc::default(),
            config,
        })
    }

    /// Builds a client and waits until the sidecar answers its readiness probe.
    ///
    /// # Errors
    /// Returns [`ServerError::Startup`] once `startup_attempts` probes failed.
    pub async fn connect(config: SidecarConfig) -> Result<Self> {
        let sidecar = Self::new(config)?;
        let attempts = sidecar.config.startup_attempts;
        tracing::info!(endpoint = %sidecar.config.endpoint, "connecting to sidecar");

        for attempt in 1..=attempts {
            match sidecar.probe().await {
                Ok(()) => {
                    tracing::info!(attempt, "sidecar ready");
                    return Ok(sidecar);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "sidecar not ready, retrying");
                    tokio::time::sleep(sidecar.config.startup_backoff).await;
                }
                Err(e) => {
                    return Err(ServerError::startup(format!(
                        "sidecar at {} not ready after {attempts} attempts: {e}",
                        sidecar.config.endpoint
                    )));
                }
            }
        }
        Err(ServerError::startup("no readiness probe was attempted"))
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &SidecarConfig {
        &self.config
    }

    async fn grpc_channel(&self) -> Result<Channel> {
        let mut cached = self.grpc_channel.lock().await;
        if let Some(channel) = cached.as_ref() {
            return Ok(channel.clone());
        }
        let channel = Endpoint::from_shared(self.config.grpc_endpoint.clone())
            .map_err(|e| ServerError::config(format!("invalid gRPC endpoint: {e}")))?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .connect()
            .await
            .map_err(|e| {
                ServerError::proxy(format!("connect to {}: {e:?}", self.config.grpc_endpoint))
            })?;
        *cached = Some(channel.clone());
        Ok(channel)
    }

    async fn forget_grpc_channel(&self) {
        *self.grpc_channel.lock().await = None;
    }

    async fn ensure_success(response: reqwest::Response, what: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServerError::sidecar(format!("{what} returned {status}: {body}")))
    }
}

#[async_trait]
impl Sidecar for DaprHttpSidecar {
    async fn invoke_binding(&self, binding: &str, description: &FailureDescription) -> Result<()> {
        let url = self.config.url(&format!("v1.0/bindings/{binding}"));
        let response = self
            .client
            .post(url)
            .json(&BindingRequest {
                data: description,
                operation: "create",
            })
            .send()
            .await?;
        Self::ensure_success(response, &format!("binding {binding}")).await
    }

    async fn publish_event(
        &self,
        pubsub: &str,
        topic: &str,
        description: &FailureDescription,
    ) -> Result<()> {
        let url = self.config.url(&format!("v1.0/publish/{pubsub}/{topic}"));
        let response = self.client.post(url).json(description).send().await?;
        Self::ensure_success(response, &format!("publish {pubsub}/{topic}")).await
    }

    async fn invoke_method(
        &self,
        app_id: &str,
        method: &str,
        body: Bytes,
    ) -> Result<MethodResponse> {
        let url = self
            .config
            .url(&format!("v1.0/invoke/{app_id}/method/{method}"));
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(MethodResponse { status, body })
    }

    async fn proxy_grpc(&self, app_id: &str, description: &FailureDescription) -> Result<()> {
        let name = serde_json::to_string(description).map_err(FaultError::from)?;
        let target = MetadataValue::<Ascii>::try_from(app_id).map_err(|e| {
            ServerError::config(format!("app id {app_id:?} is not valid metadata: {e}"))
        })?;
        tracing::debug!(%app_id, %name, "proxying gRPC call");

        let mut grpc = tonic::client::Grpc::new(self.grpc_channel().await?);
        if let Err(e) = grpc.ready().await {
            self.forget_grpc_channel().await;
            return Err(ServerError::proxy(e.to_string()));
        }

        let mut request = tonic::Request::new(HelloRequest { name });
        request.metadata_mut().insert(APP_ID_METADATA, target);
        let codec = ProstCodec::<HelloRequest, HelloReply>::default();
        match grpc
            .unary(request, PathAndQuery::from_static(GREETER_SAY_HELLO), codec)
            .await
        {
            Ok(reply) => {
                tracing::debug!(reply = %reply.get_ref().message, "proxied call answered");
                Ok(())
            }
            Err(status) => {
                if status.code() == tonic::Code::Unavailable {
                    self.forget_grpc_channel().await;
                }
                Err(ServerError::proxy(status.to_string()))
            }
        }
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(self.config.url("v1.0/healthz/outbound"))
            .send()
            .await?;
        Self::ensure_success(response, "readiness probe").await
    }
}
