//! Attachment transfer pipeline.
//!
//! Two sequential passes share the sync cycle: upload everything awaiting
//! transmission, then download authority files not yet mirrored locally.
//! The passes never run in parallel, bounding resource use on constrained
//! devices. Every file yields an outcome; failures stay local to their
//! file and the pipeline continues.

use crate::applier::SyncApplier;
use crate::cancel::CancellationToken;
use crate::error::{SyncError, SyncResult};
use crate::transport::AuthorityTransport;

/// Result of transferring one attachment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    /// The file was transmitted to the authority.
    Uploaded {
        /// Relative file path.
        path: String,
    },
    /// The file was fetched and written locally.
    Downloaded {
        /// Relative file path.
        path: String,
    },
    /// Upload skipped: the link exists but the backing file is missing.
    SkippedMissing {
        /// Relative file path.
        path: String,
    },
    /// Download found nothing: the authority answered 404.
    NotFound {
        /// Relative file path.
        path: String,
    },
    /// Transport failure; the file is retried on a later cycle.
    Failed {
        /// Relative file path.
        path: String,
        /// Failure detail.
        message: String,
    },
}

impl AttachmentOutcome {
    /// The file path this outcome refers to.
    pub fn path(&self) -> &str {
        match self {
            AttachmentOutcome::Uploaded { path }
            | AttachmentOutcome::Downloaded { path }
            | AttachmentOutcome::SkippedMissing { path }
            | AttachmentOutcome::NotFound { path }
            | AttachmentOutcome::Failed { path, .. } => path,
        }
    }

    /// Returns true for a completed transfer.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AttachmentOutcome::Uploaded { .. } | AttachmentOutcome::Downloaded { .. }
        )
    }

    /// One-line description for progress reporting.
    pub fn describe(&self) -> String {
        match self {
            AttachmentOutcome::Uploaded { path } => format!("uploaded {path}"),
            AttachmentOutcome::Downloaded { path } => format!("downloaded {path}"),
            AttachmentOutcome::SkippedMissing { path } => {
                format!("skipped {path}: local file missing")
            }
            AttachmentOutcome::NotFound { path } => format!("{path} not found on authority"),
            AttachmentOutcome::Failed { path, message } => format!("{path} failed: {message}"),
        }
    }
}

/// Runs both transfer passes. The callback receives `(index, total,
/// outcome)` per file for progress reporting.
///
/// Restartable by construction: sync flags and file presence reflect what
/// actually completed, so a rerun attempts only the remainder.
pub(crate) fn transfer(
    transport: &dyn AuthorityTransport,
    applier: &dyn SyncApplier,
    folder: &str,
    cancel: &CancellationToken,
    mut on_file: impl FnMut(usize, usize, &AttachmentOutcome),
) -> SyncResult<Vec<AttachmentOutcome>> {
    let uploads = applier.unsynced_attachments()?;
    let downloads: Vec<_> = applier
        .synced_attachments()?
        .into_iter()
        .filter_map(|link| match applier.attachment_exists(&link.path) {
            Ok(false) => Some(Ok(link)),
            Ok(true) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<SyncResult<_>>()?;

    let total = uploads.len() + downloads.len();
    let mut outcomes = Vec::with_capacity(total);

    for link in uploads {
        cancel.checkpoint()?;
        let outcome = upload_one(transport, applier, folder, &link.path)?;
        on_file(outcomes.len(), total, &outcome);
        outcomes.push(outcome);
    }

    for link in downloads {
        cancel.checkpoint()?;
        let outcome = download_one(transport, applier, &link.path)?;
        on_file(outcomes.len(), total, &outcome);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn upload_one(
    transport: &dyn AuthorityTransport,
    applier: &dyn SyncApplier,
    folder: &str,
    path: &str,
) -> SyncResult<AttachmentOutcome> {
    let Some(bytes) = applier.read_attachment(path)? else {
        tracing::warn!(path, "upload skipped, backing file missing");
        return Ok(AttachmentOutcome::SkippedMissing { path: path.into() });
    };

    match transport.upload_attachment(folder, path, &bytes) {
        Ok(()) => {
            applier.mark_attachment_synced(path)?;
            tracing::debug!(path, size = bytes.len(), "attachment uploaded");
            Ok(AttachmentOutcome::Uploaded { path: path.into() })
        }
        Err(SyncError::Transport { message, .. }) => {
            tracing::warn!(path, %message, "attachment upload failed");
            Ok(AttachmentOutcome::Failed {
                path: path.into(),
                message,
            })
        }
        Err(other) => Err(other),
    }
}

fn download_one(
    transport: &dyn AuthorityTransport,
    applier: &dyn SyncApplier,
    path: &str,
) -> SyncResult<AttachmentOutcome> {
    match transport.fetch_attachment(path) {
        Ok(Some(bytes)) => {
            applier.write_attachment(path, &bytes)?;
            applier.mark_attachment_synced(path)?;
            tracing::debug!(path, size = bytes.len(), "attachment downloaded");
            Ok(AttachmentOutcome::Downloaded { path: path.into() })
        }
        Ok(None) => {
            tracing::warn!(path, "attachment not found on authority");
            Ok(AttachmentOutcome::NotFound { path: path.into() })
        }
        Err(SyncError::Transport { message, .. }) => {
            tracing::warn!(path, %message, "attachment download failed");
            Ok(AttachmentOutcome::Failed {
                path: path.into(),
                message,
            })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::MemoryApplier;
    use crate::transport::MockTransport;
    use fieldsync_store::AttachmentLink;
    use uuid::Uuid;

    fn link(path: &str, synced: bool) -> AttachmentLink {
        AttachmentLink {
            path: path.into(),
            consignment_id: Uuid::new_v4(),
            file_name: path.into(),
            synced,
        }
    }

    #[test]
    fn upload_flips_flag_only_on_success() {
        let transport = MockTransport::new();
        let applier = MemoryApplier::new();
        applier.add_link(link("a.jpg", false));
        applier.add_file("a.jpg", vec![1, 2, 3]);

        let outcomes = transfer(
            &transport,
            &applier,
            "attachments",
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(outcomes, vec![AttachmentOutcome::Uploaded { path: "a.jpg".into() }]);
        assert!(applier.links()[0].synced);
    }

    #[test]
    fn missing_backing_file_is_skipped_and_reported() {
        let transport = MockTransport::new();
        let applier = MemoryApplier::new();
        applier.add_link(link("gone.jpg", false));

        let outcomes = transfer(
            &transport,
            &applier,
            "attachments",
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(
            outcomes,
            vec![AttachmentOutcome::SkippedMissing { path: "gone.jpg".into() }]
        );
        assert!(!applier.links()[0].synced);
    }

    #[test]
    fn upload_failure_does_not_stop_the_sequence() {
        let transport = MockTransport::new();
        transport.set_fail_uploads(true);
        let applier = MemoryApplier::new();
        applier.add_link(link("a.jpg", false));
        applier.add_file("a.jpg", vec![1]);
        applier.add_link(link("b.jpg", false));

        let outcomes = transfer(
            &transport,
            &applier,
            "attachments",
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], AttachmentOutcome::Failed { .. }));
        assert!(!applier.links()[0].synced);
    }

    #[test]
    fn download_distinguishes_not_found_from_success() {
        let transport = MockTransport::new();
        transport.add_fetch("remote/have.jpg", Some(vec![9]));
        let applier = MemoryApplier::new();
        applier.add_link(link("remote/have.jpg", true));
        applier.add_link(link("remote/missing.jpg", true));

        let outcomes = transfer(
            &transport,
            &applier,
            "attachments",
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(
            outcomes,
            vec![
                AttachmentOutcome::Downloaded { path: "remote/have.jpg".into() },
                AttachmentOutcome::NotFound { path: "remote/missing.jpg".into() },
            ]
        );
        assert_eq!(applier.read_attachment("remote/have.jpg").unwrap(), Some(vec![9]));
    }

    #[test]
    fn mirrored_files_are_not_fetched_again() {
        let transport = MockTransport::new();
        let applier = MemoryApplier::new();
        applier.add_link(link("done.jpg", true));
        applier.add_file("done.jpg", vec![1]);

        let outcomes = transfer(
            &transport,
            &applier,
            "attachments",
            &CancellationToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert!(outcomes.is_empty());
    }

    #[test]
    fn cancellation_is_observed_between_files() {
        let transport = MockTransport::new();
        let applier = MemoryApplier::new();
        applier.add_link(link("a.jpg", false));
        applier.add_file("a.jpg", vec![1]);

        let token = CancellationToken::new();
        token.cancel();

        let err = transfer(&transport, &applier, "attachments", &token, |_, _, _| {}).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(!applier.links()[0].synced);
    }
}
