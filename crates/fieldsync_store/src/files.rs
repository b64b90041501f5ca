//! Attachment file store.
//!
//! Files live under a single base directory and are addressed by sanitized
//! relative paths; the link index (`attachments` table) holds the same
//! paths.

use crate::error::{StoreError, StoreResult};
use std::fs;
use std::path::{Path, PathBuf};

/// A directory-rooted store for attachment files.
#[derive(Debug, Clone)]
pub struct AttachmentFiles {
    base: PathBuf,
}

impl AttachmentFiles {
    /// Creates a file store rooted at `base`, creating the directory if
    /// needed.
    pub fn new(base: impl Into<PathBuf>) -> StoreResult<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.base
    }

    /// Builds a sanitized relative path from folder components and a file
    /// name. Path separators and parent references inside components are
    /// stripped.
    pub fn relative_path(folders: &[&str], file_name: &str) -> StoreResult<String> {
        let name = sanitize_component(file_name);
        if name.is_empty() {
            return Err(StoreError::InvalidPath("empty file name".into()));
        }

        let mut parts: Vec<String> = folders
            .iter()
            .map(|f| sanitize_component(f))
            .filter(|f| !f.is_empty())
            .collect();
        parts.push(name);
        Ok(parts.join("/"))
    }

    /// Returns true if the file backing `path` exists.
    pub fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    /// Reads a file, returning `None` if it is missing.
    pub fn read(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a file, creating parent directories as needed.
    pub fn write(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)?;
        tracing::debug!(path, size = bytes.len(), "attachment file written");
        Ok(())
    }

    /// Deletes a file. Returns `false` if it was already absent.
    pub fn remove(&self, path: &str) -> StoreResult<bool> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath("empty path".into()));
        }
        let mut full = self.base.clone();
        for part in path.split('/') {
            if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
                return Err(StoreError::InvalidPath(path.into()));
            }
            full.push(part);
        }
        Ok(full)
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn relative_path_sanitizes_components() {
        let path = AttachmentFiles::relative_path(&["cn-1", "pho/tos"], "shot one.jpg").unwrap();
        assert_eq!(path, "cn-1/photos/shot one.jpg");

        assert!(AttachmentFiles::relative_path(&[], "").is_err());
        assert!(AttachmentFiles::relative_path(&[], "///").is_err());
    }

    #[test]
    fn write_creates_directories_and_read_roundtrips() {
        let dir = tempdir().unwrap();
        let files = AttachmentFiles::new(dir.path()).unwrap();

        files.write("cn-1/photos/a.jpg", b"bytes").unwrap();
        assert!(files.exists("cn-1/photos/a.jpg").unwrap());
        assert_eq!(files.read("cn-1/photos/a.jpg").unwrap().unwrap(), b"bytes");
    }

    #[test]
    fn read_missing_returns_none() {
        let dir = tempdir().unwrap();
        let files = AttachmentFiles::new(dir.path()).unwrap();

        assert!(files.read("nope.jpg").unwrap().is_none());
        assert!(!files.remove("nope.jpg").unwrap());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let files = AttachmentFiles::new(dir.path()).unwrap();

        assert!(files.read("../escape.jpg").is_err());
        assert!(files.write("a/../../b.jpg", b"x").is_err());
    }
}
