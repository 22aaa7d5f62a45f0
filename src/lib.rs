//! Faultline: scriptable fault-injection target for sidecar resiliency tests.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use faultline::prelude::*;
//!
//! # async fn example() -> faultline::server::Result<()> {
//! let config = HarnessConfig::default();
//! // Serves until the process is killed.
//! faultline::server::run(config, std::future::pending()).await
//! # }
//! ```

pub use faultline_core as core;
pub use faultline_server as server;

/// Prelude module for common imports.
pub mod prelude {
    pub use faultline_core::{
        AttemptRecord, CallTracker, DecisionEngine, FailureDescription, Outcome, Verdict,
    };
    pub use faultline_server::{
        AppState, DaprHttpSidecar, HarnessConfig, HarnessServer, MethodResponse, Sidecar,
    };
}
