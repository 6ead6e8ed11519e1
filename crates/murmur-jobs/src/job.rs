//! Queue job definitions.

use crate::error::JobResult;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Metadata keys stamped by queue providers.
pub mod metadata_keys {
    /// RFC 3339 time the job entered its queue.
    pub const ENQUEUED_AT: &str = "enqueued_at";
    /// RFC 3339 time the job was handed to a consumer.
    pub const DEQUEUED_AT: &str = "dequeued_at";
    /// Reason of the rejection that preceded the latest retry.
    pub const LAST_FAILURE: &str = "last_failure";
}

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unit of asynchronous work travelling through a named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Job ID.
    pub id: JobId,

    /// Routing name used by consumers to pick a handler.
    pub kind: String,

    /// Opaque payload.
    pub payload: serde_json::Value,

    /// Number of times the job was re-enqueued after dead-lettering.
    pub attempts: u32,

    /// Free-form annotations.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    /// Creates a job with a fresh ID.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            kind: kind.into(),
            payload,
            attempts: 0,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Creates a job by serializing a typed payload.
    pub fn from_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> JobResult<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Deserializes the payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> JobResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Stamps a metadata key with the current time.
    pub(crate) fn stamp(&mut self, key: &str) {
        self.metadata.insert(key.to_string(), Utc::now().to_rfc3339());
    }

    /// A payload-less stand-in for a job the provider no longer holds.
    pub(crate) fn detached(id: JobId) -> Self {
        Self {
            id,
            kind: String::new(),
            payload: serde_json::Value::Null,
            attempts: 0,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Delivery {
        notification_id: u64,
        channel: String,
    }

    #[test]
    fn test_typed_payload() {
        let delivery = Delivery {
            notification_id: 42,
            channel: "push".into(),
        };
        let job = QueueJob::from_payload("deliver_notification", &delivery).unwrap();
        assert_eq!(job.kind, "deliver_notification");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.payload_as::<Delivery>().unwrap(), delivery);
    }

    #[test]
    fn test_payload_mismatch_is_serialization_error() {
        let job = QueueJob::new("x", json!({"unexpected": true}));
        assert!(matches!(
            job.payload_as::<Delivery>(),
            Err(crate::JobError::Serialization(_))
        ));
    }

    #[test]
    fn test_metadata() {
        let job = QueueJob::new("x", json!(null)).with_metadata("source", "api");
        assert_eq!(job.metadata("source"), Some("api"));
        assert_eq!(job.metadata("missing"), None);
    }

    #[test]
    fn test_job_ids_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
