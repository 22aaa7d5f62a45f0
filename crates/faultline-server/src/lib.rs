// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # faultline-server
//!
//! HTTP surface of the faultline fault-injection target.
//!
//! - Inbound shims ([`handlers::inbound`]) feed every delivery mechanism
//!   through the [`faultline_core::DecisionEngine`]
//! - [`handlers::query`] exposes the call tracker read-only
//! - [`handlers::triggers`] forward test traffic through a [`Sidecar`]
//! - [`HarnessServer`] runs the hyper accept loop
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use faultline_server::{AppState, DaprHttpSidecar, HarnessConfig, HarnessServer};
//!
//! # async fn example() -> faultline_server::Result<()> {
//! let config = HarnessConfig::default();
//! let sidecar = DaprHttpSidecar::connect(config.sidecar.clone()).await?;
//! let server = HarnessServer::bind(AppState::new(config, Arc::new(sidecar))).await?;
//! server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod sidecar;
pub mod state;

use std::future::Future;
use std::sync::Arc;

pub use config::{HarnessConfig, SidecarConfig, Subscription, TargetConfig};
pub use error::{Result, ServerError};
pub use server::HarnessServer;
pub use sidecar::{DaprHttpSidecar, MethodResponse, Sidecar};
pub use state::AppState;

/// Connects to the sidecar, binds, and serves until `shutdown` resolves.
///
/// Fails before serving if the sidecar never becomes ready.
///
/// # Errors
/// Returns an error if the config is invalid, the sidecar is unreachable, or
/// the listen address cannot be bound.
pub async fn run<F>(config: HarnessConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let sidecar = DaprHttpSidecar::connect(config.sidecar.clone()).await?;
    let server = HarnessServer::bind(AppState::new(config, Arc::new(sidecar))).await?;
    server.serve(shutdown).await
}
