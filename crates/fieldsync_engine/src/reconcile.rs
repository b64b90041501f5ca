//! Conflict reconciliation.
//!
//! When the authority rejects an event because its target has moved on, the
//! orchestrator routes the event to the first registered reconciler that
//! claims it. An unclaimed conflict aborts the cycle: silently dropping a
//! conflicting mutation would lose data.

use crate::cancel::CancellationToken;
use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use fieldsync_protocol::{event_types, EventRecord};
use fieldsync_store::{Consignment, ConsignmentSnapshot, Store};
use std::sync::Arc;
use uuid::Uuid;

/// A per-entity-type conflict resolution strategy.
pub trait ConflictReconciler: Send + Sync {
    /// Returns true if this reconciler owns the conflicting event.
    fn can_reconcile(&self, event: &EventRecord) -> bool;

    /// Resolves the conflict. On success the orchestrator deletes the
    /// event from the outbox; on failure the event stays and the cycle
    /// aborts.
    fn reconcile(&self, event: &EventRecord, cancel: &CancellationToken) -> SyncResult<()>;
}

/// Ordered registry of reconcilers; the first claiming one wins.
#[derive(Default)]
pub struct ReconcilerRegistry {
    reconcilers: Vec<Box<dyn ConflictReconciler>>,
}

impl ReconcilerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reconciler at the end of the lookup order.
    pub fn register(&mut self, reconciler: Box<dyn ConflictReconciler>) {
        self.reconcilers.push(reconciler);
    }

    /// Finds the first reconciler claiming the event.
    pub fn resolve(&self, event: &EventRecord) -> Option<&dyn ConflictReconciler> {
        self.reconcilers
            .iter()
            .find(|r| r.can_reconcile(event))
            .map(Box::as_ref)
    }

    /// Number of registered reconcilers.
    pub fn len(&self) -> usize {
        self.reconcilers.len()
    }

    /// Returns true if no reconciler is registered.
    pub fn is_empty(&self) -> bool {
        self.reconcilers.is_empty()
    }
}

/// Default reconciler for consignments.
///
/// Preserves both versions: the authority's conflicting snapshot is
/// materialized as a new sibling record (with `conflict_of` pointing at the
/// original) and re-emitted as a create mutation, then the original local
/// snapshot is re-emitted as its own mutation. Both are pushed again on the
/// next cycle and nothing is overwritten silently.
pub struct ConsignmentConflictReconciler {
    store: Arc<Store>,
}

impl ConsignmentConflictReconciler {
    /// Creates a reconciler over the local store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl ConflictReconciler for ConsignmentConflictReconciler {
    fn can_reconcile(&self, event: &EventRecord) -> bool {
        event.data_type.as_deref() == Some(Consignment::DATA_TYPE)
            && event.conflict_payload.is_some()
    }

    fn reconcile(&self, event: &EventRecord, cancel: &CancellationToken) -> SyncResult<()> {
        cancel.checkpoint()?;

        let conflict_payload =
            event
                .conflict_payload
                .as_deref()
                .ok_or_else(|| SyncError::Reconcile {
                    event_id: event.event_id,
                    message: "missing conflict payload".into(),
                })?;

        let authority =
            ConsignmentSnapshot::from_payload(conflict_payload).map_err(|e| {
                SyncError::Reconcile {
                    event_id: event.event_id,
                    message: format!("malformed conflict payload: {e}"),
                }
            })?;
        let local =
            ConsignmentSnapshot::from_payload(&event.payload).map_err(|e| SyncError::Reconcile {
                event_id: event.event_id,
                message: format!("malformed local payload: {e}"),
            })?;

        let mut sibling = authority.record;
        sibling.id = Uuid::new_v4();
        sibling.conflict_of = Some(local.record.id);
        sibling.modified_at = Utc::now();

        self.store
            .record_consignment_event(&sibling, event_types::CREATE_CONSIGNMENT)?;
        self.store
            .record_consignment_event(&local.record, &event.event_type)?;

        tracing::info!(
            event_id = %event.event_id,
            original = %local.record.id,
            sibling = %sibling.id,
            "conflict reconciled as sibling record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::EventStatus;

    fn conflicting_event(local: &Consignment, authority: &Consignment) -> EventRecord {
        let mut event = EventRecord::new(
            event_types::UPDATE_CONSIGNMENT,
            local.id,
            Some(Consignment::DATA_TYPE.to_string()),
            local.to_payload().unwrap(),
        );
        event.status = EventStatus::Conflict;
        event.conflict_payload = Some(authority.to_payload().unwrap());
        event
    }

    #[test]
    fn registry_returns_first_claiming_reconciler() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut registry = ReconcilerRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(ConsignmentConflictReconciler::new(store)));
        assert_eq!(registry.len(), 1);

        let local = Consignment::new("CN-1");
        let authority = Consignment::new("CN-1");
        assert!(registry.resolve(&conflicting_event(&local, &authority)).is_some());

        let mut foreign = conflicting_event(&local, &authority);
        foreign.data_type = Some("Depot".into());
        assert!(registry.resolve(&foreign).is_none());
    }

    #[test]
    fn reconcile_preserves_both_versions() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let reconciler = ConsignmentConflictReconciler::new(Arc::clone(&store));

        let mut local = Consignment::new("CN-2");
        local.weight_kg = 10.0;
        store
            .record_consignment_event(&local, event_types::CREATE_CONSIGNMENT)
            .unwrap();
        // Simulate the push of the create: the outbox row is on its way out.
        let pending = store.pending_events().unwrap();
        store.remove_event(pending[0].event_id).unwrap();

        let mut authority = local.clone();
        authority.weight_kg = 12.0;

        let event = conflicting_event(&local, &authority);
        reconciler
            .reconcile(&event, &CancellationToken::new())
            .unwrap();

        let consignments = store.consignments().unwrap();
        assert_eq!(consignments.len(), 2);

        let sibling = consignments
            .iter()
            .find(|c| c.conflict_of == Some(local.id))
            .expect("sibling record exists");
        assert_eq!(sibling.weight_kg, 12.0);

        let original = store.consignment(local.id).unwrap().unwrap();
        assert_eq!(original.weight_kg, 10.0);

        // Both versions are queued for the next push.
        let pending = store.pending_events().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event_type, event_types::CREATE_CONSIGNMENT);
        assert_eq!(pending[0].mobile_event_id, sibling.id);
        assert_eq!(pending[1].event_type, event_types::UPDATE_CONSIGNMENT);
        assert_eq!(pending[1].mobile_event_id, local.id);
    }

    #[test]
    fn malformed_conflict_payload_fails_reconciliation() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let reconciler = ConsignmentConflictReconciler::new(Arc::clone(&store));

        let local = Consignment::new("CN-3");
        let mut event = EventRecord::new(
            event_types::UPDATE_CONSIGNMENT,
            local.id,
            Some(Consignment::DATA_TYPE.to_string()),
            local.to_payload().unwrap(),
        );
        event.conflict_payload = Some("not json".into());

        let err = reconciler
            .reconcile(&event, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::Reconcile { .. }));
        assert_eq!(store.pending_event_count().unwrap(), 0);
    }
}
