//! Row types for the `review_requests` and `customers` tables

use chrono::{DateTime, Utc};
use reviewdesk_core::{Customer, CustomerId, OwnerId, Request, RequestId, RequestStatus};

use crate::Error;

/// Raw row as stored in SQLite
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub message: String,
    pub status: String, // "Pending" | "Reviewed"
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for Request {
    type Error = Error;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status: RequestStatus = row.status.parse().map_err(|_| {
            Error::InvalidData(format!("Request {} has unknown status '{}'", row.id, row.status))
        })?;

        Ok(Request {
            id: RequestId::new(row.id),
            owner_id: OwnerId::new(row.owner_id),
            name: row.name,
            phone: row.phone,
            message: row.message,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: CustomerId::new(row.id),
            owner_id: OwnerId::new(row.owner_id),
            name: row.name,
            phone: row.phone,
            message: row.message,
            created_at: row.created_at,
        }
    }
}
