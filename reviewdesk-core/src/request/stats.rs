//! Dashboard counters

use serde::Serialize;

use super::model::Request;

/// Counts shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total: usize,
    pub reviewed: usize,
    pub pending: usize,
}

impl RequestStats {
    pub fn from_requests(requests: &[Request]) -> Self {
        requests.iter().fold(Self::default(), |mut stats, r| {
            stats.total += 1;
            if r.is_reviewed() {
                stats.reviewed += 1;
            } else {
                stats.pending += 1;
            }
            stats
        })
    }
}
