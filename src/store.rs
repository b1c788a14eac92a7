/*!
 # Override state store

 Durable storage for the active override record: zero or one record, fully
 replaced on every transition. Saves go through a temp file in the same
 directory followed by a rename, so a crash mid-write can never leave a
 corrupt resume record behind.
*/

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// Load/save/clear interface over the single persisted override record
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted record. A missing or empty file means no
    /// override is active.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(e)),
        }
    }

    /// Atomically replaces the record: write a sibling temp file, then
    /// rename it over the real path.
    pub fn save(&self, record: &[u8]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, record).map_err(Error::Persistence)?;
        fs::rename(&tmp, &self.path).map_err(Error::Persistence)?;
        debug!(path = %self.path.display(), len = record.len(), "override record saved");
        Ok(())
    }

    /// Removes the record. A record that never existed is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "override record cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("override.state"))
    }

    #[test]
    fn missing_file_means_no_record() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn empty_file_means_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_load_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(b"m").unwrap();
        assert_eq!(store.load().unwrap(), Some(b"m".to_vec()));

        // a new record fully replaces the old one
        store.save(b"c:200,000,050").unwrap();
        assert_eq!(store.load().unwrap(), Some(b"c:200,000,050".to_vec()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(b"z").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("override.state")]);
    }
}
