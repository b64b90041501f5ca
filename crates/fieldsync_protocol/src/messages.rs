//! Protocol messages for sync.

use crate::error::{CodecError, CodecResult};
use crate::event::{EventRecord, EventStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Push request from client: one batch of outbox events.
///
/// Every event carries the client's cursor in `last_sync_event` so the
/// authority can detect a stale client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// The client identity pushing the batch.
    pub client_id: Uuid,
    /// The batch, in outbox insertion order.
    pub events: Vec<EventRecord>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(client_id: Uuid, events: Vec<EventRecord>) -> Self {
        Self { client_id, events }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::from)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }
}

/// The authority's decision for a single pushed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    /// The event this decision is for.
    pub event_id: Uuid,
    /// The identifier the event targeted before confirmation.
    pub mobile_event_id: Uuid,
    /// The authority-confirmed target identifier.
    pub element_id: Uuid,
    /// The event's mutation kind tag, echoed back.
    pub event_type: String,
    /// The decision.
    pub status: EventStatus,
    /// The authority's version of the entity, when `status` is Conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_payload: Option<String>,
}

impl EventResult {
    /// Creates a success result confirming `element_id` as the target.
    pub fn success(event: &EventRecord, element_id: Uuid) -> Self {
        Self {
            event_id: event.event_id,
            mobile_event_id: event.mobile_event_id,
            element_id,
            event_type: event.event_type.clone(),
            status: EventStatus::Success,
            conflict_payload: None,
        }
    }

    /// Creates a conflict result carrying the authority's snapshot.
    pub fn conflict(event: &EventRecord, conflict_payload: impl Into<String>) -> Self {
        Self {
            event_id: event.event_id,
            mobile_event_id: event.mobile_event_id,
            element_id: event.element_id,
            event_type: event.event_type.clone(),
            status: EventStatus::Conflict,
            conflict_payload: Some(conflict_payload.into()),
        }
    }

    /// Creates an error result; the client retains the event for retry.
    pub fn error(event: &EventRecord) -> Self {
        Self {
            event_id: event.event_id,
            mobile_event_id: event.mobile_event_id,
            element_id: event.element_id,
            event_type: event.event_type.clone(),
            status: EventStatus::Error,
            conflict_payload: None,
        }
    }
}

/// Push response from the authority: one decision per pushed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// Per-event decisions, in batch order.
    pub results: Vec<EventResult>,
}

impl PushResponse {
    /// Creates a new push response.
    pub fn new(results: Vec<EventResult>) -> Self {
        Self { results }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::from)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }
}

/// Pull request from client: authority events strictly after `since`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// The last authority event known to be applied locally, if any.
    pub since: Option<Uuid>,
    /// The requesting client identity (its own events are excluded).
    pub client_id: Uuid,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(since: Option<Uuid>, client_id: Uuid) -> Self {
        Self { since, client_id }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::from)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }
}

/// Pull response from the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Authority events after the requested cursor, oldest first.
    pub events: Vec<EventRecord>,
}

impl PullResponse {
    /// Creates a new pull response.
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::from)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }
}

/// One entity snapshot in a full-dataset retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Entity-kind tag.
    pub data_type: String,
    /// JSON snapshot of the entity.
    pub payload: String,
}

/// Full-dataset response, used for first-time initialization only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Every live entity known to the authority.
    pub records: Vec<SnapshotRecord>,
}

impl SnapshotResponse {
    /// Creates a new snapshot response.
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::from)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(bytes).map_err(CodecError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_types;
    use proptest::prelude::*;

    fn make_event(event_type: &str) -> EventRecord {
        EventRecord::new(
            event_type,
            Uuid::new_v4(),
            Some("Consignment".into()),
            r#"{"reference":"CN-1"}"#,
        )
    }

    #[test]
    fn push_request_roundtrip() {
        let mut event = make_event(event_types::CREATE_CONSIGNMENT);
        event.last_sync_event = Some(Uuid::new_v4());

        let request = PushRequest::new(Uuid::new_v4(), vec![event]);
        let bytes = request.encode().unwrap();
        let decoded = PushRequest::decode(&bytes).unwrap();

        assert_eq!(decoded.client_id, request.client_id);
        assert_eq!(decoded.events, request.events);
    }

    #[test]
    fn push_response_constructors() {
        let event = make_event(event_types::CREATE_CONSIGNMENT);
        let confirmed = Uuid::new_v4();

        let success = EventResult::success(&event, confirmed);
        assert_eq!(success.status, EventStatus::Success);
        assert_eq!(success.element_id, confirmed);
        assert_eq!(success.mobile_event_id, event.mobile_event_id);

        let conflict = EventResult::conflict(&event, r#"{"reference":"CN-2"}"#);
        assert_eq!(conflict.status, EventStatus::Conflict);
        assert!(conflict.conflict_payload.is_some());

        let error = EventResult::error(&event);
        assert_eq!(error.status, EventStatus::Error);
        assert!(error.conflict_payload.is_none());
    }

    #[test]
    fn pull_request_roundtrip() {
        let request = PullRequest::new(Some(Uuid::new_v4()), Uuid::new_v4());
        let bytes = request.encode().unwrap();
        let decoded = PullRequest::decode(&bytes).unwrap();

        assert_eq!(decoded.since, request.since);
        assert_eq!(decoded.client_id, request.client_id);
    }

    #[test]
    fn pull_response_preserves_order() {
        let events = vec![
            make_event(event_types::CREATE_CONSIGNMENT),
            make_event(event_types::UPDATE_CONSIGNMENT),
            make_event(event_types::DELETE_CONSIGNMENT),
        ];
        let expected: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();

        let bytes = PullResponse::new(events).encode().unwrap();
        let decoded = PullResponse::decode(&bytes).unwrap();
        let actual: Vec<Uuid> = decoded.events.iter().map(|e| e.event_id).collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn snapshot_roundtrip() {
        let response = SnapshotResponse::new(vec![SnapshotRecord {
            data_type: "Consignment".into(),
            payload: r#"{"reference":"CN-9"}"#.into(),
        }]);

        let bytes = response.encode().unwrap();
        let decoded = SnapshotResponse::decode(&bytes).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].data_type, "Consignment");
    }

    proptest! {
        #[test]
        fn event_record_roundtrip_any_strings(
            event_type in "[A-Za-z]{1,24}",
            payload in ".{0,128}",
            metadata in proptest::option::of(".{0,64}"),
        ) {
            let mut event = EventRecord::new(event_type, Uuid::new_v4(), None, payload);
            event.metadata = metadata;

            let bytes = event.encode().unwrap();
            let decoded = EventRecord::decode(&bytes).unwrap();
            prop_assert_eq!(decoded, event);
        }
    }
}
