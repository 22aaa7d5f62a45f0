//! Shared state handed to every request.

use std::sync::Arc;

use faultline_core::{CallTracker, DecisionEngine};

use crate::config::HarnessConfig;
use crate::sidecar::Sidecar;

/// Everything a handler can reach.
pub struct AppState {
    engine: DecisionEngine,
    sidecar: Arc<dyn Sidecar>,
    config: HarnessConfig,
}

impl AppState {
    /// Creates state with a fresh, empty tracker.
    #[must_use]
    pub fn new(config: HarnessConfig, sidecar: Arc<dyn Sidecar>) -> Self {
        Self::with_tracker(config, sidecar, CallTracker::new())
    }

    /// Creates state recording into an existing tracker.
    #[must_use]
    pub fn with_tracker(
        config: HarnessConfig,
        sidecar: Arc<dyn Sidecar>,
        tracker: CallTracker,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(tracker),
            sidecar,
            config,
        }
    }

    /// Returns the decision engine.
    #[must_use]
    pub const fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Returns the sidecar client.
    #[must_use]
    pub fn sidecar(&self) -> &dyn Sidecar {
        self.sidecar.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
