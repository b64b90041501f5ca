//! Event records and statuses.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known event type tags.
///
/// The engine dispatches on these tags; integrators may register additional
/// tags as long as their reconcilers and remappers claim them.
pub mod event_types {
    /// A consignment was created locally.
    pub const CREATE_CONSIGNMENT: &str = "CreateConsignment";
    /// A consignment was updated locally.
    pub const UPDATE_CONSIGNMENT: &str = "UpdateConsignment";
    /// A consignment was deleted locally.
    pub const DELETE_CONSIGNMENT: &str = "DeleteConsignment";
}

/// Per-event lifecycle status, assigned by the authority on push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Pending in the local outbox, not yet decided.
    Idle,
    /// The authority recorded the event.
    Success,
    /// The authority rejected the event because its target has moved on.
    Conflict,
    /// The event could not be processed; it stays queued for the next cycle.
    Error,
}

impl EventStatus {
    /// Converts to a numeric code for storage.
    pub fn to_code(self) -> u8 {
        match self {
            EventStatus::Idle => 0,
            EventStatus::Success => 1,
            EventStatus::Conflict => 2,
            EventStatus::Error => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EventStatus::Idle),
            1 => Some(EventStatus::Success),
            2 => Some(EventStatus::Conflict),
            3 => Some(EventStatus::Error),
            _ => None,
        }
    }

    /// Returns true once the authority has durably recorded the event's
    /// effect (either accepted or surfaced as a conflict to reconcile).
    pub fn is_settled(self) -> bool {
        matches!(self, EventStatus::Success | EventStatus::Conflict)
    }
}

/// A single recorded mutation.
///
/// The same record shape serves as the durable outbox row and as the wire
/// representation exchanged with the authority.
///
/// # Fields
///
/// - `event_id`: locally generated, globally unique
/// - `mobile_event_id`: the identifier the event targets *before* the
///   authority confirms it (for creates this is the locally assigned
///   entity id)
/// - `element_id`: the authority-confirmed target identifier once known
///   (nil until then)
/// - `last_sync_event`: the client's cursor at transmission time, stamped
///   on every pushed event so the authority can detect staleness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Pre-confirmation target identifier.
    pub mobile_event_id: Uuid,
    /// Authority-confirmed target identifier (nil until confirmed).
    pub element_id: Uuid,
    /// Mutation kind tag.
    pub event_type: String,
    /// Entity-kind tag of the payload, absent for non-entity events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// When the mutation was emitted by the domain.
    pub emitted_at: DateTime<Utc>,
    /// When the event was persisted to the outbox.
    pub saved_at: DateTime<Utc>,
    /// JSON snapshot of the entity after the mutation.
    pub payload: String,
    /// The authority's conflicting snapshot, present only on conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_payload: Option<String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// Client cursor stamped at transmission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_event: Option<Uuid>,
}

impl EventRecord {
    /// Creates a new pending event targeting a locally assigned identifier.
    pub fn new(
        event_type: impl Into<String>,
        mobile_event_id: Uuid,
        data_type: Option<String>,
        payload: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::new_v4(),
            mobile_event_id,
            element_id: Uuid::nil(),
            event_type: event_type.into(),
            data_type,
            status: EventStatus::Idle,
            emitted_at: now,
            saved_at: now,
            payload: payload.into(),
            conflict_payload: None,
            metadata: None,
            last_sync_event: None,
        }
    }

    /// Returns true if this event records an entity creation.
    pub fn is_create(&self) -> bool {
        self.event_type
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("create"))
    }

    /// Returns true once the authority has confirmed an identifier that
    /// differs from the locally assigned one.
    pub fn needs_remap(&self) -> bool {
        !self.element_id.is_nil() && self.element_id != self.mobile_event_id
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
