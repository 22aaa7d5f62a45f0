//! Wire types shared by every transport.
//!
//! A [`FailureDescription`] arrives with each request under test; an
//! [`AttemptRecord`] is what the tracker keeps for it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FaultError, Result};

/// Failure script carried by an inbound request.
///
/// All attempts sharing an `id` belong to the same scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDescription {
    /// Scenario id, compared by exact value.
    pub id: String,

    /// Number of leading attempts (0-indexed) that must fail.
    ///
    /// `None` means the scenario never fails on purpose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failure_count: Option<u64>,

    /// Stall applied to failing attempts instead of an immediate error.
    ///
    /// Accepts integer nanoseconds or a humantime string on the wire.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timeout_serde"
    )]
    pub timeout: Option<Duration>,
}

impl FailureDescription {
    /// Creates a description that never fails on purpose.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_failure_count: None,
            timeout: None,
        }
    }

    /// Sets the number of attempts that must fail.
    #[must_use]
    pub const fn with_max_failures(mut self, count: u64) -> Self {
        self.max_failure_count = Some(count);
        self
    }

    /// Makes failing attempts stall for `timeout` instead of erroring.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parses and validates a description from a JSON body.
    ///
    /// # Errors
    /// Returns [`FaultError::Malformed`] if the body is not a valid description.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let description: Self =
            serde_json::from_slice(body).map_err(|e| FaultError::malformed(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Parses and validates a description from an already decoded JSON value.
    ///
    /// # Errors
    /// Returns [`FaultError::Malformed`] if the value is not a valid description.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let description: Self =
            serde_json::from_value(value).map_err(|e| FaultError::malformed(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Encodes the description for forwarding.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Validates fields serde cannot check on its own.
    ///
    /// # Errors
    /// Returns [`FaultError::Malformed`] if the id is empty or the timeout
    /// cannot be forwarded as nanoseconds.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FaultError::malformed("id cannot be empty"));
        }
        if let Some(timeout) = self.timeout.filter(|t| timeout_serde::to_nanos(*t).is_none()) {
            return Err(FaultError::malformed(format!(
                "timeout {timeout:?} does not fit in u64 nanoseconds"
            )));
        }
        Ok(())
    }
}

/// One observed attempt for a scenario id.
///
/// Serialized as `{"count": .., "timeSeen": ..}` for existing test runners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Zero-based position of the attempt within its id.
    #[serde(rename = "count")]
    pub sequence_number: u64,

    /// Wall-clock time the attempt was recorded.
    #[serde(rename = "timeSeen")]
    pub observed_at: DateTime<Utc>,
}

/// Serde helper for optional timeouts: integer nanoseconds or humantime text.
mod timeout_serde {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer, ser};

    /// Converts a timeout to wire nanoseconds; `None` if it does not fit.
    pub fn to_nanos(duration: Duration) -> Option<u64> {
        u64::try_from(duration.as_nanos()).ok()
    }

    /// Serializes a timeout as integer nanoseconds.
    ///
    /// # Errors
    /// Returns an error if the timeout does not fit in `u64` nanoseconds.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match timeout {
            Some(duration) => match to_nanos(*duration) {
                Some(nanos) => serializer.serialize_u64(nanos),
                None => Err(ser::Error::custom(format!(
                    "timeout {duration:?} does not fit in u64 nanoseconds"
                ))),
            },
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes a timeout from nanoseconds, a duration string, or null.
    ///
    /// # Errors
    /// Returns an error for negative numbers, floats, or unparseable strings.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TimeoutVisitor)
    }

    struct TimeoutVisitor;

    impl<'de> Visitor<'de> for TimeoutVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("nanoseconds as an unsigned integer or a duration such as \"50ms\"")
        }

        fn visit_u64<E: de::Error>(self, nanos: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_nanos(nanos)))
        }

        fn visit_i64<E: de::Error>(self, nanos: i64) -> Result<Self::Value, E> {
            u64::try_from(nanos)
                .map(|n| Some(Duration::from_nanos(n)))
                .map_err(|_| E::custom("timeout cannot be negative"))
        }

        fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
            let duration = humantime::parse_duration(text).map_err(E::custom)?;
            match to_nanos(duration) {
                Some(_) => Ok(Some(duration)),
                None => Err(E::custom(format!(
                    "timeout {text:?} does not fit in u64 nanoseconds"
                ))),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserialize(deserializer)
        }
    }
}
