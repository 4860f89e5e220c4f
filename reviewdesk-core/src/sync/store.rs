//! Remote store abstraction

use async_trait::async_trait;

use crate::request::{NewRequest, OwnerId, Request, RequestId, RequestStatus};
use crate::Result;

/// Queryable table of review requests
///
/// Writes are scoped to `(id, owner)`: a write targeting a row owned by
/// somebody else must affect zero rows rather than fail loudly.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// All requests of `owner`, newest first
    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Request>>;

    /// Point query for a single request
    async fn get(&self, id: &RequestId, owner: &OwnerId) -> Result<Option<Request>>;

    /// Insert a pending request; the store assigns id and timestamp
    async fn insert(&self, request: NewRequest) -> Result<Request>;

    /// Set the status of a request, returning the number of rows affected
    async fn update_status(
        &self,
        id: &RequestId,
        owner: &OwnerId,
        status: RequestStatus,
    ) -> Result<u64>;

    /// Delete a request, returning the number of rows affected
    async fn delete(&self, id: &RequestId, owner: &OwnerId) -> Result<u64>;
}
