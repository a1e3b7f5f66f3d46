use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{AssetRecord, CatalogSnapshot};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Catalog lock poisoned")]
    Poisoned,
}

/// Durable id -> AssetRecord map backed by a single JSON snapshot file.
///
/// Every mutation rewrites the whole snapshot while holding the index lock,
/// so concurrent writers within one process cannot lose each other's update.
/// The file must not be shared between processes.
pub struct Catalog {
    path: PathBuf,
    index: Mutex<HashMap<String, AssetRecord>>,
}

impl Catalog {
    /// Open the catalog at `path`, starting empty when the file is missing,
    /// empty or unreadable. A fresh empty snapshot is written in that case.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let snapshot = match read_snapshot(&path) {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                info!(path = %path.display(), "Catalog missing or empty, initializing");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Catalog unreadable, resetting to empty");
                None
            }
        };

        let index: HashMap<String, AssetRecord> = match snapshot {
            Some(snapshot) => snapshot
                .images
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            None => {
                let empty = HashMap::new();
                write_snapshot(&path, &empty)?;
                empty
            }
        };

        debug!(path = %path.display(), records = index.len(), "Catalog loaded");

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add or overwrite a record, then persist the snapshot.
    pub fn insert(&self, record: AssetRecord) -> Result<(), CatalogError> {
        debug_assert!(!record.id.is_empty(), "record id must not be empty");

        let mut index = self.lock()?;
        let id = record.id.clone();
        let previous = index.insert(id.clone(), record);

        if let Err(e) = write_snapshot(&self.path, &index) {
            // Keep memory in line with what is on disk
            match previous {
                Some(previous) => {
                    index.insert(id, previous);
                }
                None => {
                    index.remove(&id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<AssetRecord>, CatalogError> {
        Ok(self.lock()?.get(id).cloned())
    }

    /// Remove a record and persist. Returns `false` (and writes nothing) when
    /// the id is unknown.
    pub fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        let mut index = self.lock()?;
        let Some(removed) = index.remove(id) else {
            return Ok(false);
        };

        if let Err(e) = write_snapshot(&self.path, &index) {
            index.insert(removed.id.clone(), removed);
            return Err(e);
        }
        Ok(true)
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<AssetRecord>, CatalogError> {
        let index = self.lock()?;
        let mut records: Vec<AssetRecord> = index.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    pub fn len(&self) -> Result<usize, CatalogError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, AssetRecord>>, CatalogError> {
        self.index.lock().map_err(|_| CatalogError::Poisoned)
    }
}

/// `Ok(None)` for a missing or blank file.
fn read_snapshot(path: &Path) -> Result<Option<CatalogSnapshot>, CatalogError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&raw)?))
}

/// Write the full snapshot next to `path` and rename it into place.
fn write_snapshot(
    path: &Path,
    index: &HashMap<String, AssetRecord>,
) -> Result<(), CatalogError> {
    let mut images: Vec<AssetRecord> = index.values().cloned().collect();
    images.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    let data = serde_json::to_vec_pretty(&CatalogSnapshot { images })?;

    let tmp_path = temp_path(path);
    let result = (|| -> Result<(), std::io::Error> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("catalog"));
    name.push(".tmp");
    path.with_file_name(name)
}
