//! Transport layer abstraction for authority communication.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, SnapshotResponse,
};
use parking_lot::Mutex;
use uuid::Uuid;

/// Network contract with the remote authority.
///
/// This trait abstracts the wire; implementations may speak HTTP (see
/// [`crate::HttpTransport`]), or answer in process for tests. All calls are
/// blocking: the orchestrator is driven from a worker context and suspends
/// only at these boundaries.
pub trait AuthorityTransport: Send + Sync {
    /// Submits one batch of outbox events; returns one decision per event.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Requests authority events strictly after the given cursor.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Retrieves the full dataset, for first-time initialization only.
    fn retrieve_snapshot(&self) -> SyncResult<SnapshotResponse>;

    /// The last event the authority has confirmed for this client; seeds
    /// the cursor after a snapshot load.
    fn last_confirmed_event(&self, client_id: Uuid) -> SyncResult<Option<Uuid>>;

    /// Uploads one attachment file into a folder on the authority side.
    fn upload_attachment(&self, folder: &str, path: &str, bytes: &[u8]) -> SyncResult<()>;

    /// Fetches one attachment file; `None` means the authority does not
    /// have it (404), which is distinct from a transport error.
    fn fetch_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>>;
}

/// A mock transport with canned responses, for unit tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    push_responses: Mutex<Vec<PushResponse>>,
    pull_response: Mutex<Option<PullResponse>>,
    snapshot_response: Mutex<Option<SnapshotResponse>>,
    last_confirmed: Mutex<Option<Uuid>>,
    fail_uploads: Mutex<bool>,
    fetched: Mutex<Vec<(String, Option<Vec<u8>>)>>,
}

impl MockTransport {
    /// Creates a mock with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a push response; responses are consumed in order.
    pub fn queue_push_response(&self, response: PushResponse) {
        self.push_responses.lock().push(response);
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Sets the snapshot response.
    pub fn set_snapshot_response(&self, response: SnapshotResponse) {
        *self.snapshot_response.lock() = Some(response);
    }

    /// Sets the last-confirmed-event answer.
    pub fn set_last_confirmed(&self, event_id: Option<Uuid>) {
        *self.last_confirmed.lock() = event_id;
    }

    /// Makes uploads fail with a retryable transport error.
    pub fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock() = fail;
    }

    /// Registers a canned attachment fetch result for a path.
    pub fn add_fetch(&self, path: impl Into<String>, bytes: Option<Vec<u8>>) {
        self.fetched.lock().push((path.into(), bytes));
    }
}

impl AuthorityTransport for MockTransport {
    fn push(&self, _request: &PushRequest) -> SyncResult<PushResponse> {
        let mut responses = self.push_responses.lock();
        if responses.is_empty() {
            return Err(SyncError::Protocol("no mock push response queued".into()));
        }
        Ok(responses.remove(0))
    }

    fn pull(&self, _request: &PullRequest) -> SyncResult<PullResponse> {
        self.pull_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock pull response set".into()))
    }

    fn retrieve_snapshot(&self) -> SyncResult<SnapshotResponse> {
        self.snapshot_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock snapshot response set".into()))
    }

    fn last_confirmed_event(&self, _client_id: Uuid) -> SyncResult<Option<Uuid>> {
        Ok(*self.last_confirmed.lock())
    }

    fn upload_attachment(&self, _folder: &str, path: &str, _bytes: &[u8]) -> SyncResult<()> {
        if *self.fail_uploads.lock() {
            return Err(SyncError::transport_retryable(format!(
                "upload of {path} refused"
            )));
        }
        Ok(())
    }

    fn fetch_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        let fetched = self.fetched.lock();
        for (candidate, bytes) in fetched.iter() {
            if candidate == path {
                return Ok(bytes.clone());
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_responses_are_consumed_in_order() {
        let transport = MockTransport::new();
        transport.queue_push_response(PushResponse::new(vec![]));

        let request = PushRequest::new(Uuid::new_v4(), vec![]);
        assert!(transport.push(&request).is_ok());
        assert!(transport.push(&request).is_err());
    }

    #[test]
    fn fetch_falls_back_to_not_found() {
        let transport = MockTransport::new();
        transport.add_fetch("have.jpg", Some(vec![1, 2]));

        assert_eq!(
            transport.fetch_attachment("have.jpg").unwrap(),
            Some(vec![1, 2])
        );
        assert_eq!(transport.fetch_attachment("missing.jpg").unwrap(), None);
    }

    #[test]
    fn failing_uploads_surface_retryable_errors() {
        let transport = MockTransport::new();
        transport.set_fail_uploads(true);

        let err = transport
            .upload_attachment("attachments", "a.jpg", b"x")
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
