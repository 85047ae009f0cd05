//! File-based snapshot store.

use crate::backend::SnapshotStore;
use crate::error::{StorageError, StorageResult};
use leapsync_protocol::Snapshot;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A snapshot store backed by one JSON file.
///
/// # Durability
///
/// `save` writes the document to a sibling temporary file, syncs it, and
/// renames it over the target. A crash mid-save leaves either the old or
/// the new snapshot on disk, never a truncated one.
///
/// # Example
///
/// ```no_run
/// use leapsync_storage::{FileSnapshotStore, SnapshotStore};
/// use std::path::Path;
///
/// let store = FileSnapshotStore::open(Path::new("database.json")).unwrap();
/// let snapshot = store.load().unwrap();
/// store.save(&snapshot).unwrap();
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    temp_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    /// Opens the store at `path`, creating it with an empty snapshot (`{}`)
    /// if the file does not exist.
    ///
    /// Parent directories are created as needed. An existing file is left
    /// untouched, even if it turns out to be corrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directories cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");

        let store = Self {
            path: path.to_path_buf(),
            temp_path: path.with_file_name(temp_name),
            write_lock: Mutex::new(()),
        };

        if !path.exists() {
            tracing::info!(path = %path.display(), "creating empty snapshot file");
            store.save(&Snapshot::new())?;
        }
        Ok(store)
    }

    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> StorageResult<Snapshot> {
        let text = fs::read_to_string(&self.path)?;
        serde_json::from_str(&text).map_err(|err| {
            StorageError::Corrupted(format!("{}: {err}", self.path.display()))
        })
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        let _guard = self.write_lock.lock();

        let mut file = File::create(&self.temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        tracing::trace!(
            path = %self.path.display(),
            entities = snapshot.len(),
            bytes = bytes.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
