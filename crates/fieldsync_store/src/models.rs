//! Local domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A consignment: the business record captured in the field.
///
/// Identifiers are assigned locally at creation time and rewritten in place
/// once the authority confirms the canonical identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consignment {
    /// Client- or authority-assigned identifier.
    pub id: Uuid,
    /// Human-readable reference.
    pub reference: String,
    /// Gross weight in kilograms.
    pub weight_kg: f64,
    /// Volume in cubic metres.
    pub volume_m3: f64,
    /// Tare weight in kilograms.
    pub tare_kg: f64,
    /// Back-reference to the record this one conflicts with, when this
    /// record was materialized as a sibling of a diverged original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_of: Option<Uuid>,
    /// Last local modification time.
    pub modified_at: DateTime<Utc>,
}

impl Consignment {
    /// Entity-kind tag used in event records.
    pub const DATA_TYPE: &'static str = "Consignment";

    /// Creates a new consignment with a locally assigned identifier.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.into(),
            weight_kg: 0.0,
            volume_m3: 0.0,
            tare_kg: 0.0,
            conflict_of: None,
            modified_at: Utc::now(),
        }
    }

    /// Serializes this consignment as an event payload.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes a consignment from an event payload.
    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// The wire snapshot of a consignment: the record plus the relative paths
/// of the files attached to it.
///
/// Event payloads and full-dataset records both use this shape; the
/// attachment list lets a receiving client mirror the referenced files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsignmentSnapshot {
    /// The consignment record.
    #[serde(flatten)]
    pub record: Consignment,
    /// Relative paths of attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl ConsignmentSnapshot {
    /// Wraps a record with no attachments.
    pub fn of(record: Consignment) -> Self {
        Self {
            record,
            attachments: Vec::new(),
        }
    }

    /// Serializes as an event payload.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes from an event payload. Tolerates payloads without an
    /// attachment list.
    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// A link between a consignment and a locally stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentLink {
    /// Relative path of the file under the attachment root.
    pub path: String,
    /// Owning consignment.
    pub consignment_id: Uuid,
    /// Display file name.
    pub file_name: String,
    /// True once the file content is consistent with the authority
    /// (uploaded from here, or known to exist on the authority side).
    pub synced: bool,
}

/// The per-client sync watermark.
///
/// Mutated only by the orchestrator, atomically with the outcome it
/// reflects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// The client identity this cursor belongs to.
    pub client_id: Uuid,
    /// Last authority event known to be applied locally.
    pub last_event_synced: Option<Uuid>,
    /// True once a first full pull has completed.
    pub initialized: bool,
}

impl SyncCursor {
    /// Creates an uninitialized cursor for a client.
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            last_event_synced: None,
            initialized: false,
        }
    }
}
