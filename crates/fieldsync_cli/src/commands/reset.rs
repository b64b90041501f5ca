//! Reset command implementation.

use fieldsync_store::Store;
use std::path::Path;

/// Runs the reset command. Refuses without `--force`.
pub fn run(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("no database found at {}", path.display()).into());
    }
    if !force {
        return Err("reset discards all local state; pass --force to confirm".into());
    }

    let store = Store::open(path)?;
    let pending = store.pending_event_count()?;
    if pending > 0 {
        tracing::warn!(pending, "resetting with events still queued");
    }
    store.reset()?;

    println!("local state cleared; the next sync cycle re-initializes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reset_requires_force() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state.db");
        Store::open(&db).unwrap();

        assert!(run(&db, false).is_err());
        assert!(run(&db, true).is_ok());
    }

    #[test]
    fn missing_database_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(run(&dir.path().join("absent.db"), true).is_err());
    }
}
