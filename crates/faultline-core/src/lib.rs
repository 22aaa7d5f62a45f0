// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # faultline-core
//!
//! Failure-injection and call-tracking engine for the faultline target.
//!
//! - [`CallTracker`] records every attempt per scenario id
//! - [`DecisionEngine`] turns a [`FailureDescription`] into a [`Verdict`]
//! - [`Verdict::settle`] carries the verdict out (stall or not)
//!
//! ## Example
//!
//! ```rust
//! use faultline_core::{DecisionEngine, FailureDescription, Verdict};
//!
//! let engine = DecisionEngine::default();
//! let script = FailureDescription::new("s1").with_max_failures(1);
//!
//! assert_eq!(engine.decide(&script), Verdict::FailImmediately);
//! assert_eq!(engine.decide(&script), Verdict::Succeed);
//! assert_eq!(engine.tracker().attempt_count("s1"), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod tracker;
pub mod types;

pub use engine::{DecisionEngine, Outcome, Verdict};
pub use error::{FaultError, Result};
pub use tracker::{CallTracker, TrackerSnapshot};
pub use types::{AttemptRecord, FailureDescription};
