//! In-memory storage backend with fault injection.
//!
//! Backs the test suites and doc examples. Fault injection covers the two
//! failure behaviours the tracker must survive: a fully unavailable store,
//! and listings that fail only for selected prefixes (so a document listing
//! can succeed while the artifact checks of the same reconcile fail).

use crate::error::StorageError;
use crate::storage::{ObjectEntry, StorageProvider};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A [`StorageProvider`] over a process-local map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    failing_prefixes: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing the `put` overwrite check.
    ///
    /// Test shorthand for "the external worker wrote its output".
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .expect("storage lock poisoned")
            .insert(key.into(), bytes.into());
    }

    /// Remove an object, as an external actor deleting from storage would.
    pub fn remove(&self, key: &str) {
        self.objects
            .lock()
            .expect("storage lock poisoned")
            .remove(key);
    }

    /// Make every operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, v: bool) {
        self.unavailable.store(v, Ordering::SeqCst);
    }

    /// Make `list` calls fail with `Unavailable` for any prefix that starts
    /// with `prefix`. Other operations are unaffected.
    pub fn fail_listings_under(&self, prefix: impl Into<String>) {
        self.failing_prefixes
            .lock()
            .expect("storage lock poisoned")
            .push(prefix.into());
    }

    /// Clear all injected listing faults.
    pub fn clear_listing_faults(&self) {
        self.failing_prefixes
            .lock()
            .expect("storage lock poisoned")
            .clear();
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("injected outage"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.check_available()?;
        {
            let failing = self.failing_prefixes.lock().expect("storage lock poisoned");
            if failing.iter().any(|p| prefix.starts_with(p.as_str())) {
                return Err(StorageError::unavailable(format!(
                    "injected listing fault for '{prefix}'"
                )));
            }
        }
        let objects = self.objects.lock().expect("storage lock poisoned");
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectEntry {
                key: k.clone(),
                size: Some(v.len() as u64),
                updated_at: None,
            })
            .collect())
    }

    async fn put(&self, key: &str, bytes: &[u8], overwrite: bool) -> Result<(), StorageError> {
        self.check_available()?;
        let mut objects = self.objects.lock().expect("storage lock poisoned");
        if !overwrite && objects.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check_available()?;
        let objects = self.objects.lock().expect("storage lock poisoned");
        objects.get(key).cloned().ok_or(StorageError::NotFound {
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_round_trip() {
        let storage = MemoryStorage::new();
        storage.put("a/documents/x.epub", b"bytes", false).await.unwrap();

        assert_eq!(storage.get("a/documents/x.epub").await.unwrap(), b"bytes");

        let entries = storage.list("a/documents/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "a/documents/x.epub");
        assert_eq!(entries[0].size, Some(5));
    }

    #[tokio::test]
    async fn empty_prefix_lists_empty_not_error() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.list("nobody/documents/").await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn put_without_overwrite_preserves_original() {
        let storage = MemoryStorage::new();
        storage.put("k", b"one", false).await.unwrap();

        let err = storage.put("k", b"two", false).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(storage.get("k").await.unwrap(), b"one");

        storage.put("k", b"two", true).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.get("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn exists_uses_exact_key_match() {
        let storage = MemoryStorage::new();
        storage.insert("a/artifacts/book1.mp3", b"audio".to_vec());
        // A longer key sharing the prefix must not count as presence.
        storage.insert("a/artifacts/book1.mp3.part", b"tmp".to_vec());

        assert!(storage.exists("a/artifacts/book1.mp3").await.unwrap());
        assert!(!storage.exists("a/artifacts/book2.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn injected_outage_fails_everything() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        assert!(storage.list("a/").await.unwrap_err().is_transient());
        assert!(storage.get("a").await.unwrap_err().is_transient());
        assert!(storage.put("a", b"x", true).await.unwrap_err().is_transient());

        storage.set_unavailable(false);
        assert!(storage.list("a/").await.is_ok());
    }

    #[tokio::test]
    async fn listing_fault_is_prefix_scoped() {
        let storage = MemoryStorage::new();
        storage.insert("a/documents/x.epub", b"d".to_vec());
        storage.fail_listings_under("a/artifacts/");

        assert!(storage.list("a/documents/").await.is_ok());
        assert!(storage.list("a/artifacts/x.mp3").await.unwrap_err().is_transient());

        storage.clear_listing_faults();
        assert!(storage.list("a/artifacts/x.mp3").await.is_ok());
    }
}
