//! Status command implementation.

use fieldsync_store::Store;
use serde::Serialize;
use std::path::Path;

/// Pending-work summary.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Database path.
    pub path: String,
    /// Events awaiting transmission.
    pub pending_events: u64,
    /// Attachment links awaiting upload.
    pub unsynced_attachments: u64,
    /// Live consignment projections.
    pub consignments: u64,
    /// Cursor state per client identity.
    pub cursors: Vec<CursorStatus>,
}

/// Cursor state for one client.
#[derive(Debug, Serialize)]
pub struct CursorStatus {
    /// Client identity.
    pub client_id: String,
    /// Last authority event applied locally.
    pub last_event_synced: Option<String>,
    /// True once a first full pull has completed.
    pub initialized: bool,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("no database found at {}", path.display()).into());
    }
    let store = Store::open(path)?;

    let result = StatusResult {
        path: path.display().to_string(),
        pending_events: store.pending_event_count()?,
        unsynced_attachments: store.unsynced_attachment_count()?,
        consignments: store.consignment_count()?,
        cursors: store
            .cursors()?
            .into_iter()
            .map(|cursor| CursorStatus {
                client_id: cursor.client_id.to_string(),
                last_event_synced: cursor.last_event_synced.map(|id| id.to_string()),
                initialized: cursor.initialized,
            })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }
    Ok(())
}

fn print_text(result: &StatusResult) {
    println!("Database:             {}", result.path);
    println!("Pending events:       {}", result.pending_events);
    println!("Unsynced attachments: {}", result.unsynced_attachments);
    println!("Consignments:         {}", result.consignments);

    if result.cursors.is_empty() {
        println!("Cursor:               none (first sync will initialize)");
    }
    for cursor in &result.cursors {
        println!(
            "Cursor {}: last={} initialized={}",
            cursor.client_id,
            cursor.last_event_synced.as_deref().unwrap_or("-"),
            cursor.initialized
        );
    }
}
