//! Identifier remapping.
//!
//! Entities are created locally under client-generated identifiers. Once
//! the authority confirms a create and returns the canonical identifier,
//! every local reference to the provisional one must be rewritten in
//! place, inside one transaction, or future lookups corrupt.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{event_types, EventRecord};
use fieldsync_store::Store;
use std::sync::Arc;

/// A per-event-type identifier cascade strategy.
pub trait IdRemapper: Send + Sync {
    /// Returns true if this remapper owns the event type.
    fn applies_to(&self, event_type: &str) -> bool;

    /// Cascades confirmed identifiers for the given create events and
    /// returns them with `mobile_event_id` advanced to the confirmed
    /// value. Re-running against already-remapped identifiers is a no-op.
    fn remap(&self, events: &[EventRecord]) -> SyncResult<Vec<EventRecord>>;
}

/// Registry running every remapper over the events it owns.
#[derive(Default)]
pub struct RemapperRegistry {
    remappers: Vec<Box<dyn IdRemapper>>,
}

impl RemapperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a remapper.
    pub fn register(&mut self, remapper: Box<dyn IdRemapper>) {
        self.remappers.push(remapper);
    }

    /// Returns true if no remapper is registered.
    pub fn is_empty(&self) -> bool {
        self.remappers.is_empty()
    }

    /// Runs every remapper over the confirmed create events it owns and
    /// collects the updated events.
    pub fn run(&self, confirmed: &[EventRecord]) -> SyncResult<Vec<EventRecord>> {
        let mut updated = Vec::new();
        for remapper in &self.remappers {
            let owned: Vec<EventRecord> = confirmed
                .iter()
                .filter(|event| remapper.applies_to(&event.event_type))
                .cloned()
                .collect();
            if owned.is_empty() {
                continue;
            }
            updated.extend(remapper.remap(&owned)?);
        }
        Ok(updated)
    }
}

/// Cascades confirmed consignment identifiers.
///
/// One transaction per event rewrites the primary row, attachment links,
/// sibling back-references and pending outbox rows from the provisional
/// identifier to the confirmed one.
pub struct CreateConsignmentRemapper {
    store: Arc<Store>,
}

impl CreateConsignmentRemapper {
    /// Creates a remapper over the local store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl IdRemapper for CreateConsignmentRemapper {
    fn applies_to(&self, event_type: &str) -> bool {
        event_type == event_types::CREATE_CONSIGNMENT
    }

    fn remap(&self, events: &[EventRecord]) -> SyncResult<Vec<EventRecord>> {
        let mut result = Vec::with_capacity(events.len());
        for event in events {
            let mut event = event.clone();
            if event.needs_remap() {
                let affected = self
                    .store
                    .remap_consignment_id(event.mobile_event_id, event.element_id)
                    .map_err(|e| {
                        SyncError::Remap(format!(
                            "cascade {} -> {} failed: {e}",
                            event.mobile_event_id, event.element_id
                        ))
                    })?;
                tracing::debug!(
                    old = %event.mobile_event_id,
                    new = %event.element_id,
                    affected,
                    "consignment identifier cascaded"
                );
                event.mobile_event_id = event.element_id;
            }
            result.push(event);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::EventStatus;
    use fieldsync_store::{AttachmentLink, Consignment};
    use uuid::Uuid;

    fn confirmed_create(local_id: Uuid, confirmed_id: Uuid) -> EventRecord {
        let mut event = EventRecord::new(
            event_types::CREATE_CONSIGNMENT,
            local_id,
            Some(Consignment::DATA_TYPE.to_string()),
            "{}",
        );
        event.element_id = confirmed_id;
        event.status = EventStatus::Success;
        event
    }

    #[test]
    fn remap_cascades_and_advances_mobile_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let remapper = CreateConsignmentRemapper::new(Arc::clone(&store));

        let consignment = Consignment::new("CN-1");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();
        store
            .link_attachment(&AttachmentLink {
                path: "cn1/a.jpg".into(),
                consignment_id: consignment.id,
                file_name: "a.jpg".into(),
                synced: false,
            })
            .unwrap();

        let confirmed = Uuid::new_v4();
        let updated = remapper
            .remap(&[confirmed_create(consignment.id, confirmed)])
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].mobile_event_id, confirmed);

        assert!(store.consignment(consignment.id).unwrap().is_none());
        assert!(store.consignment(confirmed).unwrap().is_some());
        assert_eq!(store.attachments_for(confirmed).unwrap().len(), 1);

        // Second run: nothing left referencing the provisional id.
        let again = remapper
            .remap(&[confirmed_create(consignment.id, confirmed)])
            .unwrap();
        assert_eq!(again[0].mobile_event_id, confirmed);
    }

    #[test]
    fn unconfirmed_events_pass_through() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let remapper = CreateConsignmentRemapper::new(store);

        let local_id = Uuid::new_v4();
        let mut event = EventRecord::new(
            event_types::CREATE_CONSIGNMENT,
            local_id,
            Some(Consignment::DATA_TYPE.to_string()),
            "{}",
        );
        event.element_id = local_id; // confirmed as-is

        let updated = remapper.remap(&[event]).unwrap();
        assert_eq!(updated[0].mobile_event_id, local_id);
    }

    #[test]
    fn registry_routes_by_event_type() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut registry = RemapperRegistry::new();
        registry.register(Box::new(CreateConsignmentRemapper::new(store)));

        let update = EventRecord::new(event_types::UPDATE_CONSIGNMENT, Uuid::new_v4(), None, "{}");
        let updated = registry.run(&[update]).unwrap();
        assert!(updated.is_empty());
    }
}
