//! Review request domain types

mod model;
mod new;
mod stats;

pub use model::{payload_id, OwnerId, Request, RequestId, RequestStatus};
pub(crate) use new::validate_contact;
pub use new::{NewRequest, ValidationError};
pub use stats::RequestStats;
