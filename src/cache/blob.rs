//! Blob Store Module
//!
//! Maps slot ids to files under the storage root and performs raw byte
//! save/overwrite/delete. Pure filesystem work: no metadata is allocated
//! or consulted here.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File extension for blob files.
pub const BLOB_EXT: &str = "blob";

// == Blob Store ==
/// Filesystem store keeping one blob file per slot id.
#[derive(Debug)]
pub struct BlobStore {
    /// Directory holding all blob files
    root: PathBuf,
}

impl BlobStore {
    // == Constructor ==
    /// Creates a blob store rooted at the given directory, creating the
    /// directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // == Path Mapping ==
    /// Deterministic slot-id-to-path mapping: `<root>/<slot_id>.blob`.
    pub fn path_for(&self, slot_id: i64) -> PathBuf {
        self.root.join(format!("{slot_id}.{BLOB_EXT}"))
    }

    // == Write ==
    /// Streams `source` fully into the slot's file, overwriting any
    /// existing content, and returns the number of bytes written.
    ///
    /// The source is consumed until EOF on success and dropped (released)
    /// in every case.
    pub fn write(&self, slot_id: i64, source: &mut dyn Read) -> Result<u64> {
        let path = self.path_for(slot_id);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        let written = io::copy(source, &mut writer)?;
        writer.flush()?;
        Ok(written)
    }

    // == Delete ==
    /// Removes the slot's file.
    ///
    /// Returns `true` when the file did not exist or was removed, `false`
    /// only when a file exists and removal failed; such failures are left
    /// for a later sweep to retry.
    pub fn delete(&self, slot_id: i64) -> bool {
        let path = self.path_for(slot_id);
        !path.exists() || fs::remove_file(&path).is_ok()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path()).unwrap();
        (dir, blobs)
    }

    #[test]
    fn test_path_is_deterministic() {
        let (_dir, blobs) = store();
        assert_eq!(blobs.path_for(7), blobs.path_for(7));
        assert!(blobs.path_for(7).to_string_lossy().ends_with("7.blob"));
        assert_ne!(blobs.path_for(7), blobs.path_for(8));
    }

    #[test]
    fn test_write_and_read_back() {
        let (_dir, blobs) = store();
        let payload = b"hello blob".to_vec();

        let written = blobs.write(1, &mut Cursor::new(payload.clone())).unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(fs::read(blobs.path_for(1)).unwrap(), payload);
    }

    #[test]
    fn test_write_overwrites_existing_content() {
        let (_dir, blobs) = store();
        blobs.write(1, &mut Cursor::new(b"a longer first payload".to_vec())).unwrap();
        let written = blobs.write(1, &mut Cursor::new(b"short".to_vec())).unwrap();

        assert_eq!(written, 5);
        assert_eq!(fs::read(blobs.path_for(1)).unwrap(), b"short");
    }

    #[test]
    fn test_write_empty_source() {
        let (_dir, blobs) = store();
        let written = blobs.write(1, &mut Cursor::new(Vec::new())).unwrap();
        assert_eq!(written, 0);
        assert!(blobs.path_for(1).exists());
    }

    #[test]
    fn test_delete_missing_file_is_success() {
        let (_dir, blobs) = store();
        assert!(blobs.delete(99));
    }

    #[test]
    fn test_delete_removes_file() {
        let (_dir, blobs) = store();
        blobs.write(1, &mut Cursor::new(b"x".to_vec())).unwrap();
        assert!(blobs.delete(1));
        assert!(!blobs.path_for(1).exists());
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let blobs = BlobStore::new(&nested).unwrap();
        assert!(blobs.root().is_dir());
    }
}
