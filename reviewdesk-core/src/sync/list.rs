//! Ordered in-memory request list and change reconciliation

use crate::request::{payload_id, OwnerId, Request, RequestId, RequestStatus};

use super::feed::{ChangeEvent, ChangeKind};

/// What applying a change did to the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Entry added at the front
    Inserted,
    /// Existing entry replaced in place
    Replaced,
    /// Entry removed
    Removed,
    /// Event matched current state (or an unknown delete)
    Unchanged,
}

/// Requests of one owner, newest first, at most one entry per id
#[derive(Debug, Clone)]
pub struct RequestList {
    owner: OwnerId,
    entries: Vec<Request>,
}

impl RequestList {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            entries: Vec::new(),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn requests(&self) -> &[Request] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &RequestId) -> Option<&Request> {
        self.entries.iter().find(|r| &r.id == id)
    }

    fn position(&self, id: &RequestId) -> Option<usize> {
        self.entries.iter().position(|r| &r.id == id)
    }

    /// Replace the whole list with a fresh fetch
    ///
    /// Rows of other owners and repeated ids are dropped; the result is
    /// ordered by `created_at` descending.
    pub fn seed(&mut self, rows: Vec<Request>) {
        let mut entries: Vec<Request> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.owner_id != self.owner {
                tracing::warn!(owner = %self.owner, id = %row.id, "Dropping fetched row of another owner");
                continue;
            }
            if entries.iter().any(|r| r.id == row.id) {
                continue;
            }
            entries.push(row);
        }
        // Stable, so rows with equal timestamps keep fetch order
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.entries = entries;
    }

    /// Insert at the front, or replace in place if the id is known
    pub fn upsert(&mut self, row: Request) -> Outcome {
        match self.position(&row.id) {
            Some(idx) if self.entries[idx] == row => Outcome::Unchanged,
            Some(idx) => {
                self.entries[idx] = row;
                Outcome::Replaced
            }
            None => {
                self.entries.insert(0, row);
                Outcome::Inserted
            }
        }
    }

    pub fn remove(&mut self, id: &RequestId) -> Outcome {
        match self.position(id) {
            Some(idx) => {
                self.entries.remove(idx);
                Outcome::Removed
            }
            None => Outcome::Unchanged,
        }
    }

    /// Set the status of an entry, returning the previous status
    pub fn set_status(&mut self, id: &RequestId, status: RequestStatus) -> Option<RequestStatus> {
        let entry = self.entries.iter_mut().find(|r| &r.id == id)?;
        Some(std::mem::replace(&mut entry.status, status))
    }

    /// Apply a change event
    ///
    /// Returns the id the event referred to, or `None` when the event was
    /// dropped (malformed payload or a row of another owner).
    pub fn apply(&mut self, event: &ChangeEvent) -> Option<(RequestId, Outcome)> {
        match event.kind {
            // Insert and update share the upsert rule: a known id is
            // replaced in place, an unknown one goes to the front.
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(payload) = event.new.as_ref() else {
                    tracing::warn!(kind = ?event.kind, "Dropping change event without row payload");
                    return None;
                };
                let row = match Request::from_payload(payload) {
                    Ok(row) => row,
                    Err(e) => {
                        tracing::warn!(kind = ?event.kind, error = %e, "Dropping malformed change event");
                        return None;
                    }
                };
                if row.owner_id != self.owner {
                    tracing::debug!(owner = %self.owner, id = %row.id, "Ignoring change for another owner");
                    return None;
                }
                let id = row.id.clone();
                Some((id, self.upsert(row)))
            }
            ChangeKind::Delete => {
                let id = event
                    .old
                    .as_ref()
                    .and_then(payload_id)
                    .or_else(|| event.new.as_ref().and_then(payload_id));
                let Some(id) = id else {
                    tracing::warn!("Dropping delete event without id");
                    return None;
                };
                let outcome = self.remove(&id);
                Some((id, outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn request(id: &str, status: RequestStatus, created_at: DateTime<Utc>) -> Request {
        Request {
            id: RequestId::from(id),
            owner_id: OwnerId::from("alice"),
            name: format!("Contact {}", id),
            phone: "4412345678".to_string(),
            message: String::new(),
            status,
            created_at,
        }
    }

    fn seeded() -> RequestList {
        let mut list = RequestList::new(OwnerId::from("alice"));
        list.seed(vec![
            request("1", RequestStatus::Pending, at(2)),
            request("2", RequestStatus::Pending, at(1)),
        ]);
        list
    }

    fn ids(list: &RequestList) -> Vec<&str> {
        list.requests().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_seed_orders_newest_first_and_dedupes() {
        let mut list = RequestList::new(OwnerId::from("alice"));
        list.seed(vec![
            request("a", RequestStatus::Pending, at(1)),
            request("b", RequestStatus::Pending, at(3)),
            request("a", RequestStatus::Reviewed, at(1)),
            request("c", RequestStatus::Pending, at(2)),
        ]);

        assert_eq!(ids(&list), vec!["b", "c", "a"]);
        assert_eq!(list.get(&RequestId::from("a")).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_seed_drops_other_owner() {
        let mut list = RequestList::new(OwnerId::from("alice"));
        let mut foreign = request("x", RequestStatus::Pending, at(5));
        foreign.owner_id = OwnerId::from("mallory");
        list.seed(vec![foreign, request("1", RequestStatus::Pending, at(1))]);

        assert_eq!(ids(&list), vec!["1"]);
    }

    #[test]
    fn test_insert_prepends_without_sorting() {
        let mut list = seeded();
        // Older than everything, still goes to the front
        let event = ChangeEvent::insert(&request("3", RequestStatus::Pending, at(0))).unwrap();

        assert_eq!(list.apply(&event), Some((RequestId::from("3"), Outcome::Inserted)));
        assert_eq!(ids(&list), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_insert_newest_is_prepended() {
        let mut list = seeded();
        let event = ChangeEvent::insert(&request("3", RequestStatus::Pending, at(10))).unwrap();
        list.apply(&event);

        assert_eq!(ids(&list), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_insert_known_id_acts_as_update() {
        let mut list = seeded();
        let event = ChangeEvent::insert(&request("2", RequestStatus::Reviewed, at(1))).unwrap();

        assert_eq!(list.apply(&event), Some((RequestId::from("2"), Outcome::Replaced)));
        assert_eq!(ids(&list), vec!["1", "2"]);
        assert_eq!(list.get(&RequestId::from("2")).unwrap().status, RequestStatus::Reviewed);
    }

    #[test]
    fn test_update_keeps_position() {
        let mut list = seeded();
        let event = ChangeEvent::update(&request("2", RequestStatus::Reviewed, at(1))).unwrap();
        list.apply(&event);

        assert_eq!(ids(&list), vec!["1", "2"]);
        assert!(list.get(&RequestId::from("2")).unwrap().is_reviewed());
    }

    #[test]
    fn test_update_unknown_inserts_at_front() {
        let mut list = seeded();
        let event = ChangeEvent::update(&request("9", RequestStatus::Reviewed, at(0))).unwrap();

        assert_eq!(list.apply(&event), Some((RequestId::from("9"), Outcome::Inserted)));
        assert_eq!(ids(&list), vec!["9", "1", "2"]);
    }

    #[test]
    fn test_repeated_update_is_noop() {
        let mut list = seeded();
        let event = ChangeEvent::update(&request("1", RequestStatus::Reviewed, at(2))).unwrap();

        list.apply(&event);
        let before = list.requests().to_vec();
        assert_eq!(list.apply(&event), Some((RequestId::from("1"), Outcome::Unchanged)));
        assert_eq!(list.requests(), &before[..]);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut list = seeded();
        let event = ChangeEvent::delete(&request("42", RequestStatus::Pending, at(0))).unwrap();

        assert_eq!(list.apply(&event), Some((RequestId::from("42"), Outcome::Unchanged)));
        assert_eq!(ids(&list), vec!["1", "2"]);
    }

    #[test]
    fn test_delete_with_id_only_payload() {
        let mut list = seeded();
        let event = ChangeEvent {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(json!({ "id": "1" })),
        };

        assert_eq!(list.apply(&event), Some((RequestId::from("1"), Outcome::Removed)));
        assert_eq!(ids(&list), vec!["2"]);
    }

    #[test]
    fn test_malformed_events_dropped() {
        let mut list = seeded();
        let missing_id = ChangeEvent {
            kind: ChangeKind::Update,
            new: Some(json!({ "owner_id": "alice", "status": "Reviewed" })),
            old: None,
        };
        let no_payload = ChangeEvent {
            kind: ChangeKind::Insert,
            new: None,
            old: None,
        };
        let delete_without_id = ChangeEvent {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(json!({})),
        };

        assert_eq!(list.apply(&missing_id), None);
        assert_eq!(list.apply(&no_payload), None);
        assert_eq!(list.apply(&delete_without_id), None);
        assert_eq!(ids(&list), vec!["1", "2"]);
    }

    #[test]
    fn test_other_owner_ignored() {
        let mut list = seeded();
        let mut foreign = request("7", RequestStatus::Pending, at(9));
        foreign.owner_id = OwnerId::from("mallory");

        assert_eq!(list.apply(&ChangeEvent::insert(&foreign).unwrap()), None);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_event_sequence_keeps_ids_unique() {
        let mut list = seeded();
        let events = vec![
            ChangeEvent::insert(&request("3", RequestStatus::Pending, at(3))).unwrap(),
            ChangeEvent::insert(&request("3", RequestStatus::Pending, at(3))).unwrap(),
            ChangeEvent::update(&request("1", RequestStatus::Reviewed, at(2))).unwrap(),
            ChangeEvent::update(&request("4", RequestStatus::Pending, at(4))).unwrap(),
            ChangeEvent::delete(&request("2", RequestStatus::Pending, at(1))).unwrap(),
            ChangeEvent::update(&request("3", RequestStatus::Reviewed, at(3))).unwrap(),
            ChangeEvent::delete(&request("2", RequestStatus::Pending, at(1))).unwrap(),
        ];
        for event in &events {
            list.apply(event);
        }

        assert_eq!(ids(&list), vec!["4", "3", "1"]);
        assert!(list.get(&RequestId::from("3")).unwrap().is_reviewed());
        assert!(list.get(&RequestId::from("1")).unwrap().is_reviewed());
    }

    #[test]
    fn test_set_status_returns_previous() {
        let mut list = seeded();
        let id = RequestId::from("1");

        assert_eq!(list.set_status(&id, RequestStatus::Reviewed), Some(RequestStatus::Pending));
        assert_eq!(list.set_status(&RequestId::from("zz"), RequestStatus::Reviewed), None);
    }
}
