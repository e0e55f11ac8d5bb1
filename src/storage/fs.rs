//! Filesystem storage backend.
//!
//! Maps the flat keyspace onto a directory tree under a configurable root:
//! key `alice@example.com/documents/book1.epub` becomes
//! `<root>/alice@example.com/documents/book1.epub`. The CLI defaults to this
//! backend so the whole upload → convert → fetch loop can be exercised
//! locally — an external "worker" is then just anything that drops an `.mp3`
//! into the artifacts directory.
//!
//! Writes go to a temp file in the target directory followed by a rename, so
//! a crash mid-upload never leaves a half-written object that a listing
//! would mistake for a completed one.

use crate::error::StorageError;
use crate::storage::{ObjectEntry, StorageProvider};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// A [`StorageProvider`] over a local directory tree.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a backend rooted at `root`. The directory is created lazily on
    /// first write; a missing root lists as empty.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel.iter().map(|c| c.to_str()).collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn io_unavailable(op: &str, err: std::io::Error) -> StorageError {
    StorageError::unavailable(format!("{op}: {err}"))
}

#[async_trait]
impl StorageProvider for FsStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(r) => r,
                // A root that has never been written to is an empty store.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_unavailable("read_dir", e)),
            };
            while let Some(item) = reader
                .next_entry()
                .await
                .map_err(|e| io_unavailable("read_dir", e))?
            {
                let path = item.path();
                let meta = item
                    .metadata()
                    .await
                    .map_err(|e| io_unavailable("metadata", e))?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if !key.starts_with(prefix) || key.ends_with(".tmp") {
                    continue;
                }
                let updated_at = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs().to_string());
                entries.push(ObjectEntry {
                    key,
                    size: Some(meta.len()),
                    updated_at,
                });
            }
        }

        debug!("fs list '{}': {} entries", prefix, entries.len());
        Ok(entries)
    }

    async fn put(&self, key: &str, bytes: &[u8], overwrite: bool) -> Result<(), StorageError> {
        let path = self.path_for(key);

        if !overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_unavailable("create_dir_all", e))?;
        }

        // Temp file + rename keeps partially written objects out of listings.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_unavailable("write", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_unavailable("rename", e))?;

        debug!("fs put '{}' ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(io_unavailable("read", e)),
        }
    }
}
