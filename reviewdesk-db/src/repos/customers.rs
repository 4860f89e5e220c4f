//! Repository for staged customers

use chrono::Utc;
use reviewdesk_core::{Customer, CustomerId, NewCustomer, OwnerId, Request};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::CustomerRow;
use crate::Result;

use super::RequestRepository;

const COLUMNS: &str = "id, owner_id, name, phone, message, created_at";

/// Repository for customers waiting to be sent a review request
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
    requests: RequestRepository,
}

impl CustomerRepository {
    /// Create a new repository instance
    pub fn new(pool: SqlitePool, requests: RequestRepository) -> Self {
        Self { pool, requests }
    }

    /// Validate and stage a customer
    pub async fn create(&self, customer: &NewCustomer) -> Result<Customer> {
        customer.validate()?;

        let id = Uuid::new_v4().to_string();
        let row: CustomerRow = sqlx::query_as(&format!(
            "INSERT INTO customers (id, owner_id, name, phone, message, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(&id)
        .bind(customer.owner_id.as_str())
        .bind(customer.name.trim())
        .bind(&customer.phone)
        .bind(&customer.message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let created = Customer::from(row);
        tracing::info!(id = %created.id, owner = %created.owner_id, "Staged customer");
        Ok(created)
    }

    /// Find a customer by id, scoped to its owner
    pub async fn find(&self, id: &CustomerId, owner: &OwnerId) -> Result<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM customers WHERE id = ? AND owner_id = ?"
        ))
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Customer::from))
    }

    /// All staged customers of an owner, newest first
    pub async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Customer>> {
        let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM customers
             WHERE owner_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Customer::from).collect())
    }

    /// Delete a staged customer owned by `owner`
    pub async fn remove(&self, id: &CustomerId, owner: &OwnerId) -> Result<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "DELETE FROM customers WHERE id = ? AND owner_id = ? RETURNING {COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Customer::from))
    }

    /// Turn a staged customer into a pending review request
    ///
    /// Returns `None` when the owner has no such customer. The customer is
    /// removed once the request exists; if that removal fails the request
    /// still stands and the failure is only logged.
    pub async fn send(&self, id: &CustomerId, owner: &OwnerId) -> Result<Option<Request>> {
        let Some(customer) = self.find(id, owner).await? else {
            return Ok(None);
        };

        let request = self.requests.create(&customer.to_request()).await?;

        match self.remove(id, owner).await {
            Ok(_) => {
                tracing::info!(customer = %id, request = %request.id, "Sent review request to customer")
            }
            Err(e) => {
                tracing::warn!(customer = %id, error = %e, "Request sent but customer could not be removed")
            }
        }

        Ok(Some(request))
    }
}
