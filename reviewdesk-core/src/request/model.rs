//! Review request records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque identifier assigned by the store when a request is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an identifier produced by the store
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of the signed-in user owning a set of requests
///
/// Used as the partition key for queries and the change feed filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether the contact has left a review yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    Pending,
    Reviewed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Reviewed => "Reviewed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "reviewed" => Ok(RequestStatus::Reviewed),
            other => Err(Error::Other(format!("Unknown request status: {}", other))),
        }
    }
}

/// One review solicitation sent to a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,

    /// Owner who created the request
    pub owner_id: OwnerId,

    pub name: String,
    pub phone: String,

    /// Text sent to the contact; may be empty
    #[serde(default)]
    pub message: String,

    pub status: RequestStatus,

    /// Sort key for the live list (newest first)
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Decode a row carried in a change feed payload
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Encode this request as a change feed payload
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_reviewed(&self) -> bool {
        self.status == RequestStatus::Reviewed
    }
}

/// Extract the `id` field of a payload without decoding the whole row
pub fn payload_id(payload: &serde_json::Value) -> Option<RequestId> {
    payload
        .get("id")
        .and_then(|v| v.as_str())
        .map(RequestId::from)
}
