//! Customers staged for a review request
//!
//! A customer is recorded first and turned into a pending request when the
//! owner sends it. Sending consumes the staged entry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{validate_contact, NewRequest, OwnerId, ValidationError};

/// Identifier assigned by the store when a customer is staged
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A staged customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub owner_id: OwnerId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Request created when this customer is sent
    ///
    /// The stored message is the one the contact will see, so an empty
    /// message is replaced by the default greeting.
    pub fn to_request(&self) -> NewRequest {
        let request = NewRequest::new(self.owner_id.clone(), &self.name, &self.phone)
            .with_message(&self.message);
        let message = request.effective_message();
        request.with_message(message)
    }
}

/// A customer about to be staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub owner_id: OwnerId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: String,
}

impl NewCustomer {
    pub fn new(owner_id: OwnerId, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            phone: phone.into(),
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Same rules as a request, so a staged customer can always be sent
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_contact(&self.name, &self.phone)
    }
}
