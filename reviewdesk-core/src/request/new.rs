//! Input for creating a review request

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::OwnerId;

/// Why a new request was rejected before insert
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must be at least 2 characters")]
    Name,

    #[error("phone must be 10 to 15 digits")]
    Phone,
}

/// Name and phone rules shared by requests and staged customers
pub(crate) fn validate_contact(name: &str, phone: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < 2 {
        return Err(ValidationError::Name);
    }

    let digits = phone.len();
    if !(10..=15).contains(&digits) || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::Phone);
    }

    Ok(())
}

/// A request about to be inserted into the store
///
/// The store assigns `id` and `created_at`; status always starts as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub owner_id: OwnerId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: String,
}

impl NewRequest {
    pub fn new(owner_id: OwnerId, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            phone: phone.into(),
            message: String::new(),
        }
    }

    /// Set a custom message for the contact
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Check name and phone before sending anything to the store
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_contact(&self.name, &self.phone)
    }

    /// Message shown to the contact, falling back to a greeting
    pub fn effective_message(&self) -> String {
        if self.message.is_empty() {
            format!("Hi {}, please leave us a review!", self.name)
        } else {
            self.message.clone()
        }
    }
}
