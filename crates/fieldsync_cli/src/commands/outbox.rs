//! Outbox dump command implementation.

use fieldsync_store::Store;
use std::path::Path;

/// Runs the outbox command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("no database found at {}", path.display()).into());
    }
    let store = Store::open(path)?;

    let mut events = store.pending_events()?;
    if let Some(limit) = limit {
        events.truncate(limit);
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&events)?),
        _ => {
            if events.is_empty() {
                println!("outbox empty");
            }
            for event in &events {
                println!(
                    "{}  {:<20} target={} emitted={}",
                    event.event_id,
                    event.event_type,
                    event.mobile_event_id,
                    event.emitted_at.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}
