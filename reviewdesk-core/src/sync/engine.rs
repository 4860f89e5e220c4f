//! Live request synchronizer
//!
//! A single task owns the request list. Caller commands, change feed
//! messages and completions of remote calls are handled one at a time, so
//! the list needs no locking. Remote calls run in spawned tasks and report
//! back through a completion channel, which lets feed events be processed
//! while a fetch or a status write is still in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::request::{OwnerId, Request, RequestId, RequestStatus};
use crate::{Error, Result};

use super::feed::{ChangeEvent, ChangeFeed, FeedMessage, Subscription};
use super::list::{Outcome, RequestList};
use super::pending::{PendingWrites, Resolution};
use super::snapshot::{Freshness, SnapshotStream, SyncSnapshot};
use super::store::RequestStore;

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Subscribe {
        owner: Option<OwnerId>,
        ack: oneshot::Sender<()>,
    },
    UpdateStatus {
        id: RequestId,
        status: RequestStatus,
        reply: Reply<()>,
    },
    Refresh {
        reply: Reply<()>,
    },
    Shutdown,
}

enum Completion {
    Fetched {
        epoch: u64,
        result: Result<Vec<Request>>,
    },
    Written {
        epoch: u64,
        id: RequestId,
        seq: Option<u64>,
        result: Result<u64>,
        reply: Reply<()>,
    },
}

/// State tied to one signed-in owner
struct Session {
    list: RequestList,
    subscription: Option<Subscription>,
    /// Subscription open and not reported as disconnected
    connected: bool,
    /// Set on disconnect, cleared once a fetch has closed the gap
    stale: bool,
    seeded: bool,
    fetching: bool,
    /// A fetch was requested while another was running; the running one may
    /// have read the store before the request and cannot satisfy it
    refetch: bool,
    /// Events received while a fetch is in flight, replayed on top of it
    buffered: Vec<ChangeEvent>,
    /// Callers answered by the running fetch
    waiters: Vec<Reply<()>>,
    /// Callers answered by the follow-up fetch
    queued: Vec<Reply<()>>,
    error: Option<String>,
}

impl Session {
    fn new(owner: OwnerId, subscription: Option<Subscription>) -> Self {
        let connected = subscription.is_some();
        Self {
            list: RequestList::new(owner),
            subscription,
            connected,
            stale: !connected,
            seeded: false,
            fetching: false,
            refetch: false,
            buffered: Vec::new(),
            waiters: Vec::new(),
            queued: Vec::new(),
            error: None,
        }
    }

    fn freshness(&self) -> Freshness {
        if self.seeded && self.connected && !self.stale {
            Freshness::Live
        } else {
            Freshness::Stale
        }
    }

    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            owner: Some(self.list.owner().clone()),
            requests: self.list.requests().to_vec(),
            freshness: self.freshness(),
            seeded: self.seeded,
            error: self.error.clone(),
        }
    }
}

struct Engine {
    store: Arc<dyn RequestStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    /// Bumped on every owner change; completions from older epochs are dropped
    epoch: u64,
    session: Option<Session>,
    pending: PendingWrites,
    completions: mpsc::UnboundedSender<Completion>,
    snapshots: watch::Sender<SyncSnapshot>,
}

async fn next_message(session: &mut Option<Session>) -> Option<FeedMessage> {
    match session.as_mut().and_then(|s| s.subscription.as_mut()) {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn with_timeout<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(what))?
}

/// Copy an error for delivery to several waiters
fn replicate(error: &Error) -> Error {
    match error {
        Error::Timeout(what) => Error::Timeout(*what),
        Error::NoSession => Error::NoSession,
        Error::Closed => Error::Closed,
        Error::SessionChanged => Error::SessionChanged,
        Error::Unauthorized(id) => Error::Unauthorized(id.clone()),
        Error::NotFound(what) => Error::NotFound(what.clone()),
        other => Error::Store(other.to_string()),
    }
}

fn notify(waiters: Vec<Reply<()>>, outcome: &Result<()>) {
    for waiter in waiters {
        let _ = waiter.send(match outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(replicate(e)),
        });
    }
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
                message = next_message(&mut self.session) => self.handle_feed(message),
            }
        }

        self.teardown();
        tracing::debug!("Synchronizer stopped");
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Some(session) => session.snapshot(),
            None => SyncSnapshot::empty(None),
        };
        self.snapshots.send_replace(snapshot);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { owner, ack } => {
                self.switch_owner(owner).await;
                let _ = ack.send(());
            }
            Command::UpdateStatus { id, status, reply } => self.update_status(id, status, reply),
            Command::Refresh { reply } => self.refresh(reply).await,
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched { epoch, result } => self.finish_fetch(epoch, result),
            Completion::Written {
                epoch,
                id,
                seq,
                result,
                reply,
            } => self.finish_write(epoch, id, seq, result, reply),
        }
    }

    /// Close the current subscription and forget everything about its owner
    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(subscription) = session.subscription.as_mut() {
                subscription.close();
                tracing::debug!(owner = %subscription.owner(), "Closed request subscription");
            }
            for waiter in session.waiters.drain(..).chain(session.queued.drain(..)) {
                let _ = waiter.send(Err(Error::SessionChanged));
            }
        }
        self.pending.clear();
    }

    async fn switch_owner(&mut self, owner: Option<OwnerId>) {
        let current = self.session.as_ref().map(|s| s.list.owner());
        if current == owner.as_ref() {
            return;
        }

        self.teardown();
        self.epoch += 1;
        // Consumers see the reset before anything of the new owner arrives
        self.snapshots.send_replace(SyncSnapshot::empty(owner.clone()));

        let Some(owner) = owner else {
            tracing::info!("Session ended, request list cleared");
            return;
        };

        tracing::info!(owner = %owner, epoch = self.epoch, "Subscribing to review requests");
        let subscription = match self.feed.subscribe(&owner).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Change feed unavailable, list will be stale");
                None
            }
        };

        self.session = Some(Session::new(owner, subscription));
        self.publish();
        self.start_fetch(None);
    }

    fn start_fetch(&mut self, waiter: Option<Reply<()>>) {
        let Some(session) = self.session.as_mut() else {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(Error::NoSession));
            }
            return;
        };

        if session.fetching {
            session.refetch = true;
            session.queued.extend(waiter);
            return;
        }
        session.waiters.extend(waiter);
        session.fetching = true;
        session.buffered.clear();

        let owner = session.list.owner().clone();
        let store = Arc::clone(&self.store);
        let completions = self.completions.clone();
        let epoch = self.epoch;
        let limit = self.config.fetch_timeout;

        tokio::spawn(async move {
            let result = with_timeout(limit, "request fetch", store.list_for_owner(&owner)).await;
            let _ = completions.send(Completion::Fetched { epoch, result });
        });
    }

    fn finish_fetch(&mut self, epoch: u64, result: Result<Vec<Request>>) {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "Discarding fetch for previous session");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.fetching = false;
        let buffered = std::mem::take(&mut session.buffered);
        let waiters = std::mem::take(&mut session.waiters);
        let refetch = std::mem::take(&mut session.refetch);
        if refetch {
            session.waiters = std::mem::take(&mut session.queued);
        }

        let outcome = match result {
            Ok(rows) => {
                let fetched = rows.len();
                // A failed write must restore what the store holds now
                for row in &rows {
                    self.pending.rebase(&row.id, row.status);
                }
                session.list.seed(rows);
                for event in &buffered {
                    session.list.apply(event);
                }
                for (id, status) in self.pending.optimistic() {
                    session.list.set_status(id, status);
                }
                session.seeded = true;
                session.error = None;
                if session.connected && !refetch {
                    session.stale = false;
                }
                tracing::info!(
                    owner = %session.list.owner(),
                    fetched,
                    replayed = buffered.len(),
                    "Seeded request list"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(owner = %session.list.owner(), error = %e, "Fetch failed, keeping previous list");
                session.error = Some(e.to_string());
                Err(e)
            }
        };

        self.publish();
        notify(waiters, &outcome);

        if refetch {
            tracing::debug!("Fetch requested during a running fetch, fetching again");
            self.start_fetch(None);
        }
    }

    fn update_status(&mut self, id: RequestId, status: RequestStatus, reply: Reply<()>) {
        let Some(session) = self.session.as_mut() else {
            let _ = reply.send(Err(Error::NoSession));
            return;
        };

        let owner = session.list.owner().clone();
        let seq = session
            .list
            .set_status(&id, status)
            .map(|previous| self.pending.begin(&id, previous, status));

        match seq {
            Some(seq) => {
                tracing::debug!(id = %id, status = %status, seq, "Applied optimistic status");
                self.publish();
            }
            None => tracing::debug!(id = %id, "Status update for request not in local list"),
        }

        let store = Arc::clone(&self.store);
        let completions = self.completions.clone();
        let epoch = self.epoch;
        let limit = self.config.write_timeout;

        tokio::spawn(async move {
            let result = with_timeout(
                limit,
                "status update",
                store.update_status(&id, &owner, status),
            )
            .await;
            let _ = completions.send(Completion::Written {
                epoch,
                id,
                seq,
                result,
                reply,
            });
        });
    }

    fn finish_write(
        &mut self,
        epoch: u64,
        id: RequestId,
        seq: Option<u64>,
        result: Result<u64>,
        reply: Reply<()>,
    ) {
        let outcome = match result {
            Ok(0) => Err(Error::Unauthorized(id.to_string())),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if epoch != self.epoch {
            tracing::debug!(id = %id, "Status write finished after session change");
        } else if let Some(seq) = seq {
            match &outcome {
                Ok(()) => {
                    self.pending.confirm(&id, seq);
                    tracing::debug!(id = %id, seq, "Status update confirmed");
                }
                Err(e) => self.roll_back(&id, seq, e),
            }
        }

        let _ = reply.send(outcome);
    }

    fn roll_back(&mut self, id: &RequestId, seq: u64, error: &Error) {
        match self.pending.fail(id, seq) {
            Resolution::Restore(previous) => {
                if let Some(session) = self.session.as_mut() {
                    session.list.set_status(id, previous);
                }
                tracing::warn!(id = %id, status = %previous, error = %error, "Status update failed, rolled back");
                self.publish();
            }
            Resolution::Keep => {
                tracing::warn!(id = %id, error = %error, "Status update failed, newer state kept");
            }
        }
    }

    fn handle_feed(&mut self, message: Option<FeedMessage>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match message {
            Some(FeedMessage::Change(event)) => {
                let changed = match session.list.apply(&event) {
                    Some((id, outcome)) => {
                        self.pending.touch(&id);
                        outcome != Outcome::Unchanged
                    }
                    None => false,
                };
                if session.fetching {
                    session.buffered.push(event);
                }
                if changed {
                    self.publish();
                }
            }
            Some(FeedMessage::Disconnected) => {
                tracing::warn!(owner = %session.list.owner(), "Change feed disconnected, list may be stale");
                session.connected = false;
                session.stale = true;
                self.publish();
            }
            Some(FeedMessage::Reconnected) => {
                tracing::info!(owner = %session.list.owner(), "Change feed reconnected, re-seeding");
                session.connected = true;
                session.stale = true;
                self.start_fetch(None);
            }
            None => {
                tracing::warn!(owner = %session.list.owner(), "Change feed closed, list may be stale");
                session.subscription = None;
                session.connected = false;
                session.stale = true;
                self.publish();
            }
        }
    }

    async fn refresh(&mut self, reply: Reply<()>) {
        let Some(session) = self.session.as_mut() else {
            let _ = reply.send(Err(Error::NoSession));
            return;
        };

        if session.subscription.is_none() {
            let owner = session.list.owner().clone();
            match self.feed.subscribe(&owner).await {
                Ok(subscription) => {
                    tracing::info!(owner = %owner, "Change feed re-opened");
                    session.subscription = Some(subscription);
                    session.connected = true;
                }
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "Change feed still unavailable");
                }
            }
        }

        self.start_fetch(Some(reply));
    }
}

/// Handle to the live request list of the signed-in owner
///
/// Dropping the handle stops the background task.
pub struct Synchronizer {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SyncSnapshot>,
    task: JoinHandle<()>,
}

impl Synchronizer {
    /// Start the synchronizer task with no active session
    pub fn spawn(
        store: Arc<dyn RequestStore>,
        feed: Arc<dyn ChangeFeed>,
        config: SyncConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(SyncSnapshot::empty(None));

        let engine = Engine {
            store,
            feed,
            config,
            epoch: 0,
            session: None,
            pending: PendingWrites::new(),
            completions: completions_tx,
            snapshots: snapshots_tx,
        };
        let task = tokio::spawn(engine.run(commands_rx, completions_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            task,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Follow the requests of `owner`
    ///
    /// `None` clears the list and stops all remote activity. A different
    /// owner tears down the previous subscription, then seeds the list with
    /// a full fetch while the change feed keeps it current.
    pub async fn subscribe(&self, owner: Option<OwnerId>) -> Result<SnapshotStream> {
        let target = owner.clone();
        self.request(|ack| Command::Subscribe { owner: target, ack })
            .await?;
        Ok(SnapshotStream::new(owner, self.snapshots.clone()))
    }

    /// Change the status of a request, optimistically
    ///
    /// The local list reflects the new status before the store is contacted.
    /// A failed or unauthorized write rolls the entry back unless the feed
    /// delivered a newer state in the meantime.
    pub async fn update_status(&self, id: &RequestId, status: RequestStatus) -> Result<()> {
        let id = id.clone();
        self.request(|reply| Command::UpdateStatus { id, status, reply })
            .await?
    }

    /// Re-seed the list from the store, re-opening the feed if it was closed
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the background task and close the subscription
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Synchronizer task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::NewRequest;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::sync::feed::ChangeKind;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Request>>,
        fail_writes: AtomicBool,
        fail_fetches: AtomicBool,
        fetches: AtomicUsize,
        fetch_gates: Mutex<HashMap<OwnerId, oneshot::Receiver<()>>>,
        /// Like `fetch_gates`, but the rows are read before waiting
        read_gates: Mutex<HashMap<OwnerId, oneshot::Receiver<()>>>,
        write_gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl MemoryStore {
        fn with_rows(rows: Vec<Request>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }

        fn hold_fetch(&self, owner: &OwnerId) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.fetch_gates.lock().unwrap().insert(owner.clone(), rx);
            tx
        }

        fn hold_after_read(&self, owner: &OwnerId) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.read_gates.lock().unwrap().insert(owner.clone(), rx);
            tx
        }

        fn hold_write(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.write_gate.lock().unwrap() = Some(rx);
            tx
        }

        fn status_of(&self, id: &str) -> Option<RequestStatus> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id.as_str() == id)
                .map(|r| r.status)
        }
    }

    #[async_trait]
    impl RequestStore for MemoryStore {
        async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Request>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let gate = self.fetch_gates.lock().unwrap().remove(owner);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail_fetches.load(Ordering::SeqCst) {
                return Err(Error::Store("connection refused".to_string()));
            }
            let mut rows: Vec<Request> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| &r.owner_id == owner)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let gate = self.read_gates.lock().unwrap().remove(owner);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(rows)
        }

        async fn get(&self, id: &RequestId, owner: &OwnerId) -> Result<Option<Request>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| &r.id == id && &r.owner_id == owner)
                .cloned())
        }

        async fn insert(&self, request: NewRequest) -> Result<Request> {
            let mut rows = self.rows.lock().unwrap();
            let row = Request {
                id: RequestId::new(format!("mem-{}", rows.len() + 1)),
                owner_id: request.owner_id,
                name: request.name,
                phone: request.phone,
                message: request.message,
                status: RequestStatus::Pending,
                created_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn update_status(
            &self,
            id: &RequestId,
            owner: &OwnerId,
            status: RequestStatus,
        ) -> Result<u64> {
            let gate = self.write_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Store("connection reset".to_string()));
            }
            let mut affected = 0;
            for row in self.rows.lock().unwrap().iter_mut() {
                if &row.id == id && &row.owner_id == owner {
                    row.status = status;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn delete(&self, id: &RequestId, owner: &OwnerId) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| !(&r.id == id && &r.owner_id == owner));
            Ok((before - rows.len()) as u64)
        }
    }

    #[derive(Default)]
    struct MemoryFeed {
        subscribers: Mutex<Vec<(OwnerId, mpsc::Sender<FeedMessage>)>>,
    }

    impl MemoryFeed {
        async fn emit(&self, owner: &OwnerId, message: FeedMessage) {
            let senders: Vec<_> = self
                .subscribers
                .lock()
                .unwrap()
                .iter()
                .filter(|(o, tx)| o == owner && !tx.is_closed())
                .map(|(_, tx)| tx.clone())
                .collect();
            for tx in senders {
                let _ = tx.send(message.clone()).await;
            }
        }

        fn open_count(&self, owner: &OwnerId) -> usize {
            self.subscribers
                .lock()
                .unwrap()
                .iter()
                .filter(|(o, tx)| o == owner && !tx.is_closed())
                .count()
        }

        fn drop_all(&self) {
            self.subscribers.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl ChangeFeed for MemoryFeed {
        async fn subscribe(&self, owner: &OwnerId) -> Result<Subscription> {
            let (tx, rx) = mpsc::channel(16);
            self.subscribers.lock().unwrap().push((owner.clone(), tx));
            Ok(Subscription::new(owner.clone(), rx))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn alice() -> OwnerId {
        OwnerId::from("alice")
    }

    fn bob() -> OwnerId {
        OwnerId::from("bob")
    }

    fn request(id: &str, owner: &OwnerId, status: RequestStatus, created_at: DateTime<Utc>) -> Request {
        Request {
            id: RequestId::from(id),
            owner_id: owner.clone(),
            name: format!("Contact {}", id),
            phone: "4412345678".to_string(),
            message: String::new(),
            status,
            created_at,
        }
    }

    fn seed_rows() -> Vec<Request> {
        vec![
            request("2", &alice(), RequestStatus::Pending, at(1)),
            request("1", &alice(), RequestStatus::Pending, at(2)),
            request("b1", &bob(), RequestStatus::Pending, at(3)),
        ]
    }

    fn setup(rows: Vec<Request>) -> (Arc<MemoryStore>, Arc<MemoryFeed>, Synchronizer) {
        setup_with(rows, SyncConfig::default())
    }

    fn setup_with(
        rows: Vec<Request>,
        config: SyncConfig,
    ) -> (Arc<MemoryStore>, Arc<MemoryFeed>, Synchronizer) {
        let store = Arc::new(MemoryStore::with_rows(rows));
        let feed = Arc::new(MemoryFeed::default());
        let sync = Synchronizer::spawn(store.clone(), feed.clone(), config);
        (store, feed, sync)
    }

    fn short_timeouts() -> SyncConfig {
        SyncConfig {
            fetch_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_millis(50),
            ..SyncConfig::default()
        }
    }

    async fn wait_for_fetches(store: &MemoryStore, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.fetches.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for fetch");
    }

    async fn wait_until(
        stream: &mut SnapshotStream,
        predicate: impl Fn(&SyncSnapshot) -> bool,
    ) -> SyncSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let current = stream.current();
                if predicate(&current) {
                    return current;
                }
                stream.changed().await.expect("synchronizer stopped");
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    fn ids(snapshot: &SyncSnapshot) -> Vec<&str> {
        snapshot.requests.iter().map(|r| r.id.as_str()).collect()
    }

    fn status_of(snapshot: &SyncSnapshot, id: &str) -> Option<RequestStatus> {
        snapshot
            .requests
            .iter()
            .find(|r| r.id.as_str() == id)
            .map(|r| r.status)
    }

    fn change(kind: ChangeKind, row: &Request) -> FeedMessage {
        FeedMessage::Change(match kind {
            ChangeKind::Insert => ChangeEvent::insert(row).unwrap(),
            ChangeKind::Update => ChangeEvent::update(row).unwrap(),
            ChangeKind::Delete => ChangeEvent::delete(row).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_no_owner_yields_empty_list_without_remote_calls() {
        let (store, feed, sync) = setup(seed_rows());

        let stream = sync.subscribe(None).await.unwrap();
        let snapshot = stream.current();

        assert!(snapshot.owner.is_none());
        assert!(snapshot.requests.is_empty());
        assert!(snapshot.seeded);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(feed.open_count(&alice()), 0);
    }

    #[tokio::test]
    async fn test_seed_is_newest_first_for_owner() {
        let (_store, feed, sync) = setup(seed_rows());

        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        let snapshot = stream.wait_seeded().await.unwrap();

        assert_eq!(ids(&snapshot), vec!["1", "2"]);
        assert!(snapshot.is_live());
        assert_eq!(feed.open_count(&alice()), 1);
    }

    #[tokio::test]
    async fn test_same_owner_does_not_reset() {
        let (store, _feed, sync) = setup(seed_rows());

        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();
        let mut again = sync.subscribe(Some(alice())).await.unwrap();

        assert_eq!(ids(&again.wait_seeded().await.unwrap()), vec!["1", "2"]);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_optimistic_update_rolls_back_on_failure() {
        let (store, _feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let gate = store.hold_write();
        let id = RequestId::from("1");

        let update = sync.update_status(&id, RequestStatus::Reviewed);
        let observe = async {
            let optimistic =
                wait_until(&mut stream, |s| status_of(s, "1") == Some(RequestStatus::Reviewed)).await;
            assert_eq!(ids(&optimistic), vec!["1", "2"]);
            assert_eq!(status_of(&optimistic, "2"), Some(RequestStatus::Pending));
            gate.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(update, observe);

        assert!(matches!(result, Err(Error::Store(_))));
        let snapshot = sync.snapshot();
        assert_eq!(ids(&snapshot), vec!["1", "2"]);
        assert_eq!(status_of(&snapshot, "1"), Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn test_confirmed_update_ignores_echo() {
        let (store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        let id = RequestId::from("1");
        sync.update_status(&id, RequestStatus::Reviewed).await.unwrap();
        assert_eq!(store.status_of("1"), Some(RequestStatus::Reviewed));
        let before = sync.snapshot();

        let echo = request("1", &alice(), RequestStatus::Reviewed, at(2));
        feed.emit(&alice(), change(ChangeKind::Update, &echo)).await;
        feed.emit(&alice(), change(ChangeKind::Update, &echo)).await;
        // Processed in order, so once 3 shows up the echoes were handled
        let marker = request("3", &alice(), RequestStatus::Pending, at(0));
        feed.emit(&alice(), change(ChangeKind::Insert, &marker)).await;

        let after = wait_until(&mut stream, |s| status_of(s, "3").is_some()).await;
        assert_eq!(ids(&after), vec!["3", "1", "2"]);
        assert_eq!(&after.requests[1..], &before.requests[..]);
    }

    #[tokio::test]
    async fn test_update_of_foreign_request_is_unauthorized() {
        let (store, _feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        let before = stream.wait_seeded().await.unwrap();

        let result = sync
            .update_status(&RequestId::from("b1"), RequestStatus::Reviewed)
            .await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(store.status_of("b1"), Some(RequestStatus::Pending));
        assert_eq!(sync.snapshot().requests, before.requests);
    }

    #[tokio::test]
    async fn test_update_without_session() {
        let (_store, _feed, sync) = setup(seed_rows());

        let result = sync
            .update_status(&RequestId::from("1"), RequestStatus::Reviewed)
            .await;
        assert!(matches!(result, Err(Error::NoSession)));
    }

    #[tokio::test]
    async fn test_switching_owner_resets_list_first() {
        let (_store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        let mut stream = sync.subscribe(Some(bob())).await.unwrap();
        let reset = stream.current();
        assert_eq!(reset.owner, Some(bob()));
        assert!(reset.requests.iter().all(|r| r.owner_id == bob()));

        let seeded = stream.wait_seeded().await.unwrap();
        assert_eq!(ids(&seeded), vec!["b1"]);
        assert_eq!(feed.open_count(&alice()), 0);
        assert_eq!(feed.open_count(&bob()), 1);
    }

    #[tokio::test]
    async fn test_sign_out_clears_list() {
        let (_store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        let stream = sync.subscribe(None).await.unwrap();
        assert!(stream.current().requests.is_empty());
        assert_eq!(feed.open_count(&alice()), 0);
    }

    #[tokio::test]
    async fn test_late_fetch_of_previous_owner_discarded() {
        let (store, _feed, sync) = setup(seed_rows());
        let gate = store.hold_fetch(&alice());

        sync.subscribe(Some(alice())).await.unwrap();
        let mut stream = sync.subscribe(Some(bob())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        gate.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sync.refresh().await.unwrap();

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.owner, Some(bob()));
        assert_eq!(ids(&snapshot), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_feed_state_survives_failed_write() {
        let (store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let gate = store.hold_write();
        let id = RequestId::from("1");

        let update = sync.update_status(&id, RequestStatus::Reviewed);
        let observe = async {
            wait_until(&mut stream, |s| status_of(s, "1") == Some(RequestStatus::Reviewed)).await;
            let mut edited = request("1", &alice(), RequestStatus::Reviewed, at(2));
            edited.message = "edited elsewhere".to_string();
            feed.emit(&alice(), change(ChangeKind::Update, &edited)).await;
            wait_until(&mut stream, |s| {
                s.requests.iter().any(|r| r.message == "edited elsewhere")
            })
            .await;
            gate.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(update, observe);

        assert!(result.is_err());
        let snapshot = sync.snapshot();
        assert_eq!(status_of(&snapshot, "1"), Some(RequestStatus::Reviewed));
        assert_eq!(snapshot.requests[0].message, "edited elsewhere");
    }

    #[tokio::test]
    async fn test_events_during_seed_are_replayed() {
        let (store, feed, sync) = setup(seed_rows());
        let gate = store.hold_fetch(&alice());

        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        let late = request("3", &alice(), RequestStatus::Pending, at(5));
        feed.emit(&alice(), change(ChangeKind::Insert, &late)).await;
        let removed = request("2", &alice(), RequestStatus::Pending, at(1));
        feed.emit(&alice(), change(ChangeKind::Delete, &removed)).await;
        wait_until(&mut stream, |s| status_of(s, "3").is_some()).await;
        gate.send(()).unwrap();

        let snapshot = wait_until(&mut stream, |s| s.seeded).await;
        assert_eq!(ids(&snapshot), vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let (_store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        let broken = FeedMessage::Change(ChangeEvent {
            kind: ChangeKind::Update,
            new: Some(json!({ "status": "Reviewed" })),
            old: None,
        });
        feed.emit(&alice(), broken).await;
        let next = request("4", &alice(), RequestStatus::Pending, at(9));
        feed.emit(&alice(), change(ChangeKind::Insert, &next)).await;

        let snapshot = wait_until(&mut stream, |s| status_of(s, "4").is_some()).await;
        assert_eq!(ids(&snapshot), vec!["4", "1", "2"]);
        assert_eq!(status_of(&snapshot, "1"), Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn test_disconnect_marks_stale_and_reconnect_reseeds() {
        let (store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        feed.emit(&alice(), FeedMessage::Disconnected).await;
        let stale = wait_until(&mut stream, |s| !s.is_live()).await;
        assert_eq!(ids(&stale), vec!["1", "2"]);

        // Written while disconnected, so no event will ever arrive for it
        store
            .rows
            .lock()
            .unwrap()
            .push(request("5", &alice(), RequestStatus::Reviewed, at(10)));
        feed.emit(&alice(), FeedMessage::Reconnected).await;

        let live = wait_until(&mut stream, |s| s.is_live() && status_of(s, "5").is_some()).await;
        assert_eq!(ids(&live), vec!["5", "1", "2"]);
    }

    #[tokio::test]
    async fn test_closed_feed_is_reopened_by_refresh() {
        let (_store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        feed.drop_all();
        wait_until(&mut stream, |s| !s.is_live()).await;

        sync.refresh().await.unwrap();
        assert!(sync.snapshot().is_live());
        assert_eq!(feed.open_count(&alice()), 1);
    }

    #[tokio::test]
    async fn test_failed_seed_reports_error() {
        let (store, _feed, sync) = setup(seed_rows());
        store.fail_fetches.store(true, Ordering::SeqCst);

        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        assert!(matches!(stream.wait_seeded().await, Err(Error::Store(_))));

        store.fail_fetches.store(false, Ordering::SeqCst);
        sync.refresh().await.unwrap();
        let snapshot = stream.wait_seeded().await.unwrap();
        assert_eq!(ids(&snapshot), vec!["1", "2"]);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_list() {
        let (store, _feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        store.fail_fetches.store(true, Ordering::SeqCst);
        assert!(sync.refresh().await.is_err());

        let snapshot = sync.snapshot();
        assert_eq!(ids(&snapshot), vec!["1", "2"]);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_reconnect_during_refresh_fetches_again() {
        let (store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        // The refresh reads the store, then stalls until released
        let gate = store.hold_after_read(&alice());
        let refresh = sync.refresh();
        let observe = async {
            wait_for_fetches(&store, 2).await;
            feed.emit(&alice(), FeedMessage::Disconnected).await;
            wait_until(&mut stream, |s| !s.is_live()).await;
            store
                .rows
                .lock()
                .unwrap()
                .push(request("5", &alice(), RequestStatus::Pending, at(10)));
            feed.emit(&alice(), FeedMessage::Reconnected).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(refresh, observe);
        result.unwrap();

        // The first live snapshot must include what was written during the gap
        let live = wait_until(&mut stream, |s| s.is_live()).await;
        assert_eq!(ids(&live), vec!["5", "1", "2"]);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refresh_during_fetch_is_answered_by_next_fetch() {
        let (store, _feed, sync) = setup(seed_rows());
        let gate = store.hold_after_read(&alice());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        wait_for_fetches(&store, 1).await;

        store
            .rows
            .lock()
            .unwrap()
            .push(request("6", &alice(), RequestStatus::Pending, at(11)));
        let refresh = sync.refresh();
        let release = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(refresh, release);
        result.unwrap();

        assert_eq!(ids(&sync.snapshot()), vec!["6", "1", "2"]);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
        assert!(stream.wait_seeded().await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_failed_write_restores_status_fetched_after_reconnect() {
        let (store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let gate = store.hold_write();
        let id = RequestId::from("1");

        let update = sync.update_status(&id, RequestStatus::Reviewed);
        let observe = async {
            wait_until(&mut stream, |s| status_of(s, "1") == Some(RequestStatus::Reviewed)).await;
            feed.emit(&alice(), FeedMessage::Disconnected).await;
            wait_until(&mut stream, |s| !s.is_live()).await;
            // Another client marks it reviewed while no events arrive
            for row in store.rows.lock().unwrap().iter_mut() {
                if row.id.as_str() == "1" {
                    row.status = RequestStatus::Reviewed;
                }
            }
            feed.emit(&alice(), FeedMessage::Reconnected).await;
            wait_until(&mut stream, |s| s.is_live()).await;
            gate.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(update, observe);

        assert!(matches!(result, Err(Error::Store(_))));
        let snapshot = sync.snapshot();
        assert_eq!(status_of(&snapshot, "1"), Some(RequestStatus::Reviewed));
        assert_eq!(store.status_of("1"), Some(RequestStatus::Reviewed));
        assert!(snapshot.is_live());
    }

    #[tokio::test]
    async fn test_write_timeout_rolls_back() {
        let (store, _feed, sync) = setup_with(seed_rows(), short_timeouts());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        // Never released
        let _gate = store.hold_write();
        let result = sync
            .update_status(&RequestId::from("1"), RequestStatus::Reviewed)
            .await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        let snapshot = sync.snapshot();
        assert_eq!(ids(&snapshot), vec!["1", "2"]);
        assert_eq!(status_of(&snapshot, "1"), Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn test_fetch_timeout_keeps_list() {
        let (store, _feed, sync) = setup_with(seed_rows(), short_timeouts());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        let before = stream.wait_seeded().await.unwrap();

        let _gate = store.hold_fetch(&alice());
        let result = sync.refresh().await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.requests, before.requests);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_seed_timeout_reported_to_waiter() {
        let (store, _feed, sync) = setup_with(seed_rows(), short_timeouts());
        let _gate = store.hold_fetch(&alice());

        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        assert!(matches!(stream.wait_seeded().await, Err(Error::Store(_))));
        assert!(sync.snapshot().requests.is_empty());
    }

    #[tokio::test]
    async fn test_wait_seeded_fails_after_owner_switch() {
        let (store, _feed, sync) = setup(seed_rows());
        let _gate = store.hold_fetch(&alice());

        let mut waiting = sync.subscribe(Some(alice())).await.unwrap();
        let mut current = sync.subscribe(Some(bob())).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), waiting.wait_seeded())
            .await
            .expect("wait_seeded did not return");
        assert!(matches!(result, Err(Error::SessionChanged)));
        assert_eq!(ids(&current.wait_seeded().await.unwrap()), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_refresh_pending_at_owner_switch_fails() {
        let (store, _feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        let _gate = store.hold_fetch(&alice());
        let refresh = sync.refresh();
        let switch = async {
            wait_for_fetches(&store, 2).await;
            sync.subscribe(Some(bob())).await.unwrap();
        };
        let (result, ()) = tokio::join!(refresh, switch);

        assert!(matches!(result, Err(Error::SessionChanged)));
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscription() {
        let (_store, feed, sync) = setup(seed_rows());
        let mut stream = sync.subscribe(Some(alice())).await.unwrap();
        stream.wait_seeded().await.unwrap();

        sync.shutdown().await;
        assert_eq!(feed.open_count(&alice()), 0);
    }
}
