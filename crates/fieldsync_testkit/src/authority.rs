//! A scripted in-memory authority.

use fieldsync_engine::{AuthorityTransport, SyncError, SyncResult};
use fieldsync_protocol::{
    EventRecord, EventResult, PullRequest, PullResponse, PushRequest, PushResponse,
    SnapshotRecord, SnapshotResponse,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct AuthorityState {
    /// Per-event idempotency ledger: a decision, once made, is replayed
    /// verbatim for the same `event_id` with no repeated effect.
    ledger: HashMap<Uuid, EventResult>,
    /// Events the authority has accepted, in arrival order.
    recorded: Vec<EventRecord>,
    /// Scripted conflicts: event id to the authority's snapshot.
    conflicts: HashMap<Uuid, String>,
    /// Scripted per-event transient failures (answer Error, no ledger).
    transient: HashSet<Uuid>,
    /// Scripted confirmed identifiers for creates, by provisional id.
    assigned: HashMap<Uuid, Uuid>,
    /// Events served on pull, oldest first.
    feed: Vec<EventRecord>,
    /// Full dataset served on snapshot retrieval.
    snapshot: Vec<SnapshotRecord>,
    /// Answer to `last_confirmed_event`.
    last_confirmed: Option<Uuid>,
    /// Attachment files by path.
    files: HashMap<String, Vec<u8>>,
    /// Upload log: (folder, path).
    uploads: Vec<(String, String)>,
    /// When set, push/pull/transfer answer a retryable transport error.
    offline: bool,
    /// Number of push batches received.
    push_batches: u64,
}

/// A stateful authority living in process.
///
/// Scripts conflicts, transient failures and confirmed identifiers per
/// event, serves a pull feed and a snapshot, and stores attachments.
#[derive(Default)]
pub struct InMemoryAuthority {
    state: Mutex<AuthorityState>,
}

impl InMemoryAuthority {
    /// Creates an empty authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a conflict for an event: the push answers Conflict carrying
    /// `authority_payload`.
    pub fn script_conflict(&self, event_id: Uuid, authority_payload: impl Into<String>) {
        self.state
            .lock()
            .conflicts
            .insert(event_id, authority_payload.into());
    }

    /// Scripts a transient failure: the push answers Error for this event
    /// until [`InMemoryAuthority::clear_transient`] is called.
    pub fn script_transient(&self, event_id: Uuid) {
        self.state.lock().transient.insert(event_id);
    }

    /// Clears a scripted transient failure.
    pub fn clear_transient(&self, event_id: Uuid) {
        self.state.lock().transient.remove(&event_id);
    }

    /// Scripts the confirmed identifier for a create pushed under a
    /// provisional one. Without a script, identifiers are confirmed as-is.
    pub fn assign_id(&self, provisional: Uuid, confirmed: Uuid) {
        self.state.lock().assigned.insert(provisional, confirmed);
    }

    /// Appends an event to the pull feed.
    pub fn queue_remote_event(&self, event: EventRecord) {
        self.state.lock().feed.push(event);
    }

    /// Sets the full dataset served on snapshot retrieval.
    pub fn set_snapshot(&self, records: Vec<SnapshotRecord>) {
        self.state.lock().snapshot = records;
    }

    /// Sets the answer to `last_confirmed_event`.
    pub fn set_last_confirmed(&self, event_id: Option<Uuid>) {
        self.state.lock().last_confirmed = event_id;
    }

    /// Stores an attachment file the client can fetch.
    pub fn put_file(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.state.lock().files.insert(path.into(), bytes);
    }

    /// Takes the authority offline (retryable transport errors) or back
    /// online.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Events the authority has accepted, in arrival order.
    pub fn recorded_events(&self) -> Vec<EventRecord> {
        self.state.lock().recorded.clone()
    }

    /// Paths uploaded so far, with their folders.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().uploads.clone()
    }

    /// Number of push batches received.
    pub fn push_batches(&self) -> u64 {
        self.state.lock().push_batches
    }

    fn decide(state: &mut AuthorityState, event: &EventRecord) -> EventResult {
        if let Some(previous) = state.ledger.get(&event.event_id) {
            // Already decided: replay without a second effect.
            return previous.clone();
        }

        if state.transient.contains(&event.event_id) {
            return EventResult::error(event);
        }

        if let Some(payload) = state.conflicts.get(&event.event_id).cloned() {
            let result = EventResult::conflict(event, payload);
            state.ledger.insert(event.event_id, result.clone());
            return result;
        }

        let element_id = if event.is_create() {
            state
                .assigned
                .get(&event.mobile_event_id)
                .copied()
                .unwrap_or(event.mobile_event_id)
        } else {
            event.mobile_event_id
        };

        let result = EventResult::success(event, element_id);
        state.recorded.push(event.clone());
        state.ledger.insert(event.event_id, result.clone());
        result
    }
}

impl AuthorityTransport for InMemoryAuthority {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(SyncError::transport_retryable("authority offline"));
        }
        state.push_batches += 1;

        let results = request
            .events
            .iter()
            .map(|event| Self::decide(&mut state, event))
            .collect();
        Ok(PushResponse::new(results))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let state = self.state.lock();
        if state.offline {
            return Err(SyncError::transport_retryable("authority offline"));
        }

        let start = match request.since {
            None => 0,
            Some(since) => state
                .feed
                .iter()
                .position(|e| e.event_id == since)
                .map(|pos| pos + 1)
                .unwrap_or(0),
        };
        Ok(PullResponse::new(state.feed[start..].to_vec()))
    }

    fn retrieve_snapshot(&self) -> SyncResult<SnapshotResponse> {
        let state = self.state.lock();
        if state.offline {
            return Err(SyncError::transport_retryable("authority offline"));
        }
        Ok(SnapshotResponse::new(state.snapshot.clone()))
    }

    fn last_confirmed_event(&self, _client_id: Uuid) -> SyncResult<Option<Uuid>> {
        Ok(self.state.lock().last_confirmed)
    }

    fn upload_attachment(&self, folder: &str, path: &str, bytes: &[u8]) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(SyncError::transport_retryable("authority offline"));
        }
        state.files.insert(path.to_string(), bytes.to_vec());
        state.uploads.push((folder.to_string(), path.to_string()));
        Ok(())
    }

    fn fetch_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        let state = self.state.lock();
        if state.offline {
            return Err(SyncError::transport_retryable("authority offline"));
        }
        Ok(state.files.get(path).cloned())
    }
}
