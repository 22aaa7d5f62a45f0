//! Failure decision engine.
//!
//! Records every attempt first, then decides from the attempt's ordinal, so
//! a retried request differs from a fresh one only by its position in the
//! tracker.

use std::time::Duration;

use crate::tracker::CallTracker;
use crate::types::FailureDescription;

/// How the transport should answer the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Respond with success right away.
    Succeed,
    /// Block for the duration, then respond with success.
    ///
    /// Whichever deadline is shorter, this stall or the caller's timeout
    /// policy, decides what the caller observes.
    StallThenSucceed(Duration),
    /// Respond with a server error right away.
    FailImmediately,
}

impl Verdict {
    /// Applies the failure script to an attempt ordinal.
    #[must_use]
    pub fn for_attempt(description: &FailureDescription, attempt: u64) -> Self {
        match description.max_failure_count {
            Some(max) if attempt < max => match description.timeout {
                Some(stall) => Self::StallThenSucceed(stall),
                None => Self::FailImmediately,
            },
            _ => Self::Succeed,
        }
    }

    /// Carries out the verdict and reports what to send back.
    ///
    /// The stall is not tied to the caller's deadline; if the caller goes
    /// away the future is simply dropped.
    pub async fn settle(self) -> Outcome {
        match self {
            Self::Succeed => Outcome::Success,
            Self::StallThenSucceed(stall) => {
                tracing::debug!(?stall, "stalling before success");
                tokio::time::sleep(stall).await;
                Outcome::Success
            }
            Self::FailImmediately => Outcome::Failure,
        }
    }
}

/// Final result handed to a transport once a verdict has been carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answer with the transport's success response.
    Success,
    /// Answer with the transport's server-error response.
    Failure,
}

/// Stateless decision engine over a shared [`CallTracker`].
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    tracker: CallTracker,
}

impl DecisionEngine {
    /// Creates an engine writing to `tracker`.
    #[must_use]
    pub const fn new(tracker: CallTracker) -> Self {
        Self { tracker }
    }

    /// Returns the tracker this engine records into.
    #[must_use]
    pub const fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// Records the attempt and returns the verdict for it.
    pub fn decide(&self, description: &FailureDescription) -> Verdict {
        let attempt = self.tracker.record_attempt(&description.id);
        let verdict = Verdict::for_attempt(description, attempt);
        tracing::info!(
            id = %description.id,
            attempt,
            max_failure_count = ?description.max_failure_count,
            ?verdict,
            "attempt recorded"
        );
        verdict
    }
}
