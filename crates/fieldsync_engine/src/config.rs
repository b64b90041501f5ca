//! Configuration for the sync engine.

/// Configuration for sync cycles.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of events per push/pull batch.
    pub batch_size: usize,
    /// Protocol version advertised to the authority.
    pub protocol_version: u16,
    /// Folder on the authority side receiving uploaded attachments.
    pub attachment_folder: String,
}

impl SyncConfig {
    /// Default number of events per batch.
    pub const DEFAULT_BATCH_SIZE: usize = 10;

    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            protocol_version: 1,
            attachment_folder: "attachments".into(),
        }
    }

    /// Sets the batch size (clamped to at least 1).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the authority-side attachment folder.
    pub fn with_attachment_folder(mut self, folder: impl Into<String>) -> Self {
        self.attachment_folder = folder.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::new();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.protocol_version, 1);
    }

    #[test]
    fn batch_size_never_zero() {
        let config = SyncConfig::new().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
