//! Harness configuration.
//!
//! Per Iron Lotus Framework: Configuration is validated at load time (Poka-Yoke),
//! with sensible defaults and clear error messages. Every field has a default
//! matching the stock sidecar deployment, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, ServerError};

/// Environment variable overriding the listen port.
pub const APP_PORT_ENV: &str = "APP_PORT";

/// Environment variable carrying the sidecar's HTTP port.
pub const DAPR_HTTP_PORT_ENV: &str = "DAPR_HTTP_PORT";

/// Environment variable carrying the sidecar's gRPC port.
pub const DAPR_GRPC_PORT_ENV: &str = "DAPR_GRPC_PORT";

/// Routes served by the harness itself; subscriptions may not shadow them.
const RESERVED_ROUTES: &[&str] = &[
    "dapr/subscribe",
    "resiliencyInvocation",
    "resiliencybinding",
    "tests",
];

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Sidecar client settings.
    #[serde(default)]
    pub sidecar: SidecarConfig,

    /// Peer apps reached by the invokeService triggers.
    #[serde(default)]
    pub targets: TargetConfig,

    /// Topics announced on `/dapr/subscribe`.
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<Subscription>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_subscriptions() -> Vec<Subscription> {
    vec![Subscription::new(
        "dapr-resiliency-pubsub",
        "resiliency-topic-http",
        "resiliency-topic-http",
    )]
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sidecar: SidecarConfig::default(),
            targets: TargetConfig::default(),
            subscriptions: default_subscriptions(),
        }
    }
}

impl HarnessConfig {
    /// Parses a configuration from TOML text and validates it.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ServerError::config(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Applies `APP_PORT` and `DAPR_HTTP_PORT` from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set to something other than a port.
    pub fn apply_env(&mut self) -> Result<()> {
        let app_port = std::env::var(APP_PORT_ENV).ok();
        let sidecar_port = std::env::var(DAPR_HTTP_PORT_ENV).ok();
        let grpc_port = std::env::var(DAPR_GRPC_PORT_ENV).ok();
        self.apply_port_overrides(app_port.as_deref(), sidecar_port.as_deref())?;
        self.apply_grpc_port_override(grpc_port.as_deref())
    }

    /// Points the gRPC proxy endpoint at a loopback port given as text.
    ///
    /// # Errors
    /// Returns an error if the value is not a valid port.
    pub fn apply_grpc_port_override(&mut self, grpc_port: Option<&str>) -> Result<()> {
        if let Some(raw) = grpc_port {
            let port = parse_port(DAPR_GRPC_PORT_ENV, raw)?;
            self.sidecar.grpc_endpoint = format!("http://127.0.0.1:{port}");
        }
        Ok(())
    }

    /// Applies port overrides given as text.
    ///
    /// # Errors
    /// Returns an error if a value is not a valid port.
    pub fn apply_port_overrides(
        &mut self,
        app_port: Option<&str>,
        sidecar_port: Option<&str>,
    ) -> Result<()> {
        if let Some(raw) = app_port {
            self.listen_addr.set_port(parse_port(APP_PORT_ENV, raw)?);
        }
        if let Some(raw) = sidecar_port {
            let port = parse_port(DAPR_HTTP_PORT_ENV, raw)?;
            self.sidecar.endpoint = format!("http://127.0.0.1:{port}");
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        self.sidecar.validate()?;
        self.targets.validate()?;

        let mut routes = HashSet::new();
        for subscription in &self.subscriptions {
            subscription.validate()?;
            if !routes.insert(subscription.route_path()) {
                return Err(ServerError::config(format!(
                    "duplicate subscription route: {}",
                    subscription.route
                )));
            }
        }
        Ok(())
    }

    /// Finds the subscription whose route matches `path` (without leading slash).
    #[must_use]
    pub fn subscription_for(&self, path: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.route_path() == path)
    }
}

fn parse_port(name: &str, raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| ServerError::config(format!("{name}={raw:?} is not a port: {e}")))
}

/// Sidecar client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Base URL of the sidecar HTTP API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// URL of the sidecar gRPC port, used to proxy calls to the gRPC peer.
    #[serde(default = "default_grpc_endpoint")]
    pub grpc_endpoint: String,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Readiness probes attempted at startup before giving up.
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,

    /// Delay between readiness probes.
    #[serde(default = "default_startup_backoff")]
    #[serde(with = "humantime_serde")]
    pub startup_backoff: Duration,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3500".to_string()
}

fn default_grpc_endpoint() -> String {
    "http://127.0.0.1:50001".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_startup_attempts() -> u32 {
    10
}

fn default_startup_backoff() -> Duration {
    Duration::from_secs(5)
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            grpc_endpoint: default_grpc_endpoint(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            startup_attempts: default_startup_attempts(),
            startup_backoff: default_startup_backoff(),
        }
    }
}

impl SidecarConfig {
    /// Creates a config pointing at `endpoint` with default timeouts.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Validates the sidecar settings.
    ///
    /// # Errors
    /// Returns an error if the endpoint or retry budget is invalid.
    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("endpoint", &self.endpoint),
            ("grpc_endpoint", &self.grpc_endpoint),
        ];
        for (name, url) in urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ServerError::config(format!(
                    "sidecar {name} must be an http(s) URL: {url}"
                )));
            }
        }
        if self.startup_attempts == 0 {
            return Err(ServerError::config("startup_attempts must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ServerError::config("request_timeout cannot be zero"));
        }
        Ok(())
    }

    /// Joins an API path onto the endpoint.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Peer applications used by the invokeService triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// App id of the HTTP peer.
    #[serde(default = "default_http_app_id")]
    pub http_app_id: String,

    /// Method invoked on the HTTP peer.
    #[serde(default = "default_http_method")]
    pub http_method: String,

    /// App id of the gRPC peer.
    #[serde(default = "default_grpc_app_id")]
    pub grpc_app_id: String,

    /// Method invoked on the gRPC peer.
    #[serde(default = "default_grpc_method")]
    pub grpc_method: String,

    /// Method returning the gRPC peer's own call counts.
    #[serde(default = "default_grpc_call_count_method")]
    pub grpc_call_count_method: String,
}

fn default_http_app_id() -> String {
    "resiliencyapp".to_string()
}

fn default_http_method() -> String {
    "resiliencyInvocation".to_string()
}

fn default_grpc_app_id() -> String {
    "resiliencyappgrpc".to_string()
}

fn default_grpc_method() -> String {
    "grpcInvoke".to_string()
}

fn default_grpc_call_count_method() -> String {
    "GetCallCount".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            http_app_id: default_http_app_id(),
            http_method: default_http_method(),
            grpc_app_id: default_grpc_app_id(),
            grpc_method: default_grpc_method(),
            grpc_call_count_method: default_grpc_call_count_method(),
        }
    }
}

impl TargetConfig {
    /// Validates the target names.
    ///
    /// # Errors
    /// Returns an error if any name is empty.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("http_app_id", &self.http_app_id),
            ("http_method", &self.http_method),
            ("grpc_app_id", &self.grpc_app_id),
            ("grpc_method", &self.grpc_method),
            ("grpc_call_count_method", &self.grpc_call_count_method),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(ServerError::config(format!("{name} cannot be empty")));
            }
        }
        Ok(())
    }
}

/// One pub/sub subscription announced to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Pub/sub component name.
    pub pubsubname: String,
    /// Topic name.
    pub topic: String,
    /// Route the sidecar delivers events to.
    pub route: String,
}

impl Subscription {
    /// Creates a subscription.
    #[must_use]
    pub fn new(
        pubsubname: impl Into<String>,
        topic: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            pubsubname: pubsubname.into(),
            topic: topic.into(),
            route: route.into(),
        }
    }

    /// Route without surrounding slashes, as matched by the router.
    #[must_use]
    pub fn route_path(&self) -> &str {
        self.route.trim_matches('/')
    }

    /// Validates the subscription.
    ///
    /// # Errors
    /// Returns an error if a field is empty or the route shadows a built-in one.
    pub fn validate(&self) -> Result<()> {
        if self.pubsubname.is_empty() || self.topic.is_empty() {
            return Err(ServerError::config(
                "subscription pubsubname and topic cannot be empty",
            ));
        }
        let route = self.route_path();
        if route.is_empty() {
            return Err(ServerError::config(format!(
                "subscription route for {}/{} cannot be empty",
                self.pubsubname, self.topic
            )));
        }
        let first_segment = route.split('/').next().unwrap_or(route);
        if RESERVED_ROUTES.contains(&route) || RESERVED_ROUTES.contains(&first_segment) {
            return Err(ServerError::config(format!(
                "subscription route {route} collides with a built-in route"
            )));
        }
        Ok(())
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
