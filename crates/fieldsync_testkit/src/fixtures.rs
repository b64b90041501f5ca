//! Fixture builders.

use fieldsync_protocol::{event_types, EventRecord, SnapshotRecord};
use fieldsync_store::Consignment;

/// Builds a consignment with plausible field values.
pub fn consignment(reference: &str) -> Consignment {
    let mut record = Consignment::new(reference);
    record.weight_kg = 120.0;
    record.volume_m3 = 1.5;
    record.tare_kg = 14.0;
    record
}

/// Builds a pending create event for a consignment.
pub fn create_event(record: &Consignment) -> EventRecord {
    entity_event(record, event_types::CREATE_CONSIGNMENT)
}

/// Builds a pending update event for a consignment.
pub fn update_event(record: &Consignment) -> EventRecord {
    entity_event(record, event_types::UPDATE_CONSIGNMENT)
}

/// Builds a pending delete event for a consignment.
pub fn delete_event(record: &Consignment) -> EventRecord {
    entity_event(record, event_types::DELETE_CONSIGNMENT)
}

/// Builds an authority-side update event suitable for the pull feed: the
/// target identifier is already confirmed.
pub fn remote_update(record: &Consignment) -> EventRecord {
    let mut event = entity_event(record, event_types::UPDATE_CONSIGNMENT);
    event.element_id = record.id;
    event
}

/// Builds a full-dataset record for a consignment.
pub fn snapshot_record(record: &Consignment) -> SnapshotRecord {
    SnapshotRecord {
        data_type: Consignment::DATA_TYPE.to_string(),
        payload: record.to_payload().expect("consignment serializes"),
    }
}

fn entity_event(record: &Consignment, event_type: &str) -> EventRecord {
    EventRecord::new(
        event_type,
        record.id,
        Some(Consignment::DATA_TYPE.to_string()),
        record.to_payload().expect("consignment serializes"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_target_the_record() {
        let record = consignment("CN-1");
        assert_eq!(record.reference, "CN-1");

        let create = create_event(&record);
        assert!(create.is_create());
        assert_eq!(create.mobile_event_id, record.id);
        assert!(create.element_id.is_nil());

        let update = update_event(&record);
        assert_eq!(update.event_type, event_types::UPDATE_CONSIGNMENT);

        let delete = delete_event(&record);
        assert_eq!(delete.event_type, event_types::DELETE_CONSIGNMENT);

        let remote = remote_update(&record);
        assert_eq!(remote.element_id, record.id);

        let snapshot = snapshot_record(&record);
        assert_eq!(snapshot.data_type, Consignment::DATA_TYPE);
    }
}
