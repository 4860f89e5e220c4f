//! Repository for review request operations

use async_trait::async_trait;
use chrono::Utc;
use reviewdesk_core::{
    ChangeKind, NewRequest, OwnerId, Request, RequestId, RequestStatus, RequestStore,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::hub::ChangeHub;
use crate::models::RequestRow;
use crate::Result;

const COLUMNS: &str = "id, owner_id, name, phone, message, status, created_at";

/// Repository for managing review requests
///
/// Every successful write is published on the [`ChangeHub`].
#[derive(Debug, Clone)]
pub struct RequestRepository {
    pool: SqlitePool,
    hub: ChangeHub,
}

impl RequestRepository {
    /// Create a new repository instance
    pub fn new(pool: SqlitePool, hub: ChangeHub) -> Self {
        Self { pool, hub }
    }

    /// Validate and insert a new pending request
    pub async fn create(&self, request: &NewRequest) -> Result<Request> {
        request.validate()?;

        let id = Uuid::new_v4().to_string();
        let row: RequestRow = sqlx::query_as(&format!(
            "INSERT INTO review_requests (id, owner_id, name, phone, message, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(&id)
        .bind(request.owner_id.as_str())
        .bind(request.name.trim())
        .bind(&request.phone)
        .bind(&request.message)
        .bind(RequestStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let created = Request::try_from(row)?;
        tracing::info!(id = %created.id, owner = %created.owner_id, "Created review request");
        self.hub.publish(ChangeKind::Insert, &created);
        Ok(created)
    }

    /// Find a request by id, scoped to its owner
    pub async fn find(&self, id: &RequestId, owner: &OwnerId) -> Result<Option<Request>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM review_requests WHERE id = ? AND owner_id = ?"
        ))
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Request::try_from).transpose()
    }

    /// All requests of an owner, newest first
    pub async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Request>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE owner_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Request::try_from).collect()
    }

    /// Requests of an owner in one status, newest first
    pub async fn list_by_status(
        &self,
        owner: &OwnerId,
        status: RequestStatus,
    ) -> Result<Vec<Request>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE owner_id = ? AND status = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Request::try_from).collect()
    }

    /// Set the status of a request owned by `owner`
    ///
    /// Returns `None` when no row matched, including rows of other owners.
    pub async fn set_status(
        &self,
        id: &RequestId,
        owner: &OwnerId,
        status: RequestStatus,
    ) -> Result<Option<Request>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "UPDATE review_requests SET status = ?
             WHERE id = ? AND owner_id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::debug!(id = %id, owner = %owner, "Status update matched no rows");
            return Ok(None);
        };

        let updated = Request::try_from(row)?;
        tracing::debug!(id = %id, status = %updated.status, "Updated request status");
        self.hub.publish(ChangeKind::Update, &updated);
        Ok(Some(updated))
    }

    /// Delete a request owned by `owner`, returning the removed row
    pub async fn remove(&self, id: &RequestId, owner: &OwnerId) -> Result<Option<Request>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "DELETE FROM review_requests
             WHERE id = ? AND owner_id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let removed = Request::try_from(row)?;
        tracing::info!(id = %id, owner = %owner, "Removed review request");
        self.hub.publish(ChangeKind::Delete, &removed);
        Ok(Some(removed))
    }

    /// Fetch a request or fail with [`Error::NotFound`]
    #[cfg(test)]
    pub async fn get_or_not_found(&self, id: &RequestId, owner: &OwnerId) -> Result<Request> {
        self.find(id, owner)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("Request {} not found", id)))
    }
}

#[async_trait]
impl RequestStore for RequestRepository {
    async fn list_for_owner(&self, owner: &OwnerId) -> reviewdesk_core::Result<Vec<Request>> {
        Ok(self.list_by_owner(owner).await?)
    }

    async fn get(
        &self,
        id: &RequestId,
        owner: &OwnerId,
    ) -> reviewdesk_core::Result<Option<Request>> {
        Ok(self.find(id, owner).await?)
    }

    async fn insert(&self, request: NewRequest) -> reviewdesk_core::Result<Request> {
        Ok(self.create(&request).await?)
    }

    async fn update_status(
        &self,
        id: &RequestId,
        owner: &OwnerId,
        status: RequestStatus,
    ) -> reviewdesk_core::Result<u64> {
        Ok(u64::from(self.set_status(id, owner, status).await?.is_some()))
    }

    async fn delete(&self, id: &RequestId, owner: &OwnerId) -> reviewdesk_core::Result<u64> {
        Ok(u64::from(self.remove(id, owner).await?.is_some()))
    }
}
