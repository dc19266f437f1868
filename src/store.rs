//! Persisted device store
//!
//! A single JSON document (`devices.json`) in the data directory holds
//! every device ever reconciled. Each reconciliation pass reads the
//! full snapshot and writes a full replacement; the replacement goes
//! through a temp file + rename so a failed write leaves the previous
//! document intact.

use std::path::{Path, PathBuf};

use crate::device::DeviceRecord;

const STORE_FILE: &str = "devices.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read device store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("device store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write device store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize device store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// File-backed store for the canonical device set.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted snapshot. A missing file is an empty store;
    /// unreadable or corrupt content is an error (the registry treats
    /// it as fatal to the pass rather than silently dropping history).
    pub fn load(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Replace the full document. Writes to a sibling temp file first
    /// and renames it over the store, so the old snapshot survives any
    /// failure before the rename.
    pub fn replace(&self, devices: &[DeviceRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(devices)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Write {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!("Persisted {} device(s) to {}", devices.len(), self.path.display());
        Ok(())
    }
}
