//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted behind a trait so integrators can
//! plug in whichever library their platform provides; this module only owns
//! URL layout and JSON framing.

use crate::error::{SyncError, SyncResult};
use crate::transport::AuthorityTransport;
use fieldsync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, SnapshotResponse,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// HTTP client abstraction.
///
/// Implement this to provide the actual transport (reqwest, ureq, a
/// platform HTTP stack). Errors are plain strings; the transport wraps
/// them as retryable transport failures.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Sends a GET request. `Ok(None)` means HTTP 404.
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, String>;
}

/// HTTP-based authority transport using JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against a base URL such as
    /// `https://sync.example.com`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
        self.connected.store(false, Ordering::SeqCst);
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
        self.connected.store(true, Ordering::SeqCst);
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.post(&url, body).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        self.clear_error();

        serde_json::from_slice(&response)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }

    fn get_json<Res>(&self, endpoint: &str) -> SyncResult<Option<Res>>
    where
        Res: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        self.clear_error();

        response
            .map(|body| {
                serde_json::from_slice(&body)
                    .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
            })
            .transpose()
    }
}

impl<C: HttpClient> AuthorityTransport for HttpTransport<C> {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_json("/sync/push", request)
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.post_json("/sync/pull", request)
    }

    fn retrieve_snapshot(&self) -> SyncResult<SnapshotResponse> {
        self.get_json("/sync/snapshot")?
            .ok_or_else(|| SyncError::Protocol("snapshot endpoint returned 404".into()))
    }

    fn last_confirmed_event(&self, client_id: Uuid) -> SyncResult<Option<Uuid>> {
        Ok(self
            .get_json::<Option<Uuid>>(&format!("/sync/last-event/{client_id}"))?
            .flatten())
    }

    fn upload_attachment(&self, folder: &str, path: &str, bytes: &[u8]) -> SyncResult<()> {
        let url = format!("{}/attachments/{folder}/{path}", self.base_url);
        self.client.post(&url, bytes.to_vec()).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        self.clear_error();
        Ok(())
    }

    fn fetch_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        let url = format!("{}/attachments/{path}", self.base_url);
        let response = self.client.get(&url).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        self.clear_error();
        Ok(response)
    }
}
