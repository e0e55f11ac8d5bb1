//! Session entry points: the glue between identity, storage, tracker, and
//! poller.
//!
//! [`SyncSession`] is what a host application (or the `readsai` CLI) holds.
//! It reads the current principal from the identity collaborator on every
//! operation — never caching it — so a sign-out between calls is honoured
//! immediately, and it funnels every mutation through the tracker's single
//! entry point so the optimistic view stays consistent.

use crate::config::SyncConfig;
use crate::error::{StorageError, SyncError};
use crate::identity::{IdentityProvider, Principal};
use crate::naming::derive_artifact_name_with;
use crate::observer::ObserverHandle;
use crate::poller::Poller;
use crate::record::{ConversionRecord, RecordStore};
use crate::storage::{Namespace, StorageProvider};
use crate::stream::{watch_stream, ViewStream};
use crate::tracker::{ConversionTracker, Document};
use std::sync::Arc;
use tracing::{info, warn};

/// EPUB containers are ZIP archives; the local-file-header magic is enough
/// to reject the most common mistake (uploading a bare text or PDF file).
const EPUB_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// A principal-scoped synchronization session.
///
/// # Example
/// ```rust,no_run
/// use readsai_sync::{StaticIdentity, MemoryStorage, SyncConfig, SyncSession};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = SyncSession::new(
///     Arc::new(StaticIdentity::signed_in("alice@example.com")),
///     Arc::new(MemoryStorage::new()),
///     SyncConfig::default(),
/// );
///
/// let epub = std::fs::read("book1.epub")?;
/// session.upload("book1.epub", &epub).await?;
///
/// for doc in session.refresh().await? {
///     println!("{}: {:?}", doc.name, doc.status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SyncSession {
    identity: Arc<dyn IdentityProvider>,
    storage: Arc<dyn StorageProvider>,
    records: Option<Arc<dyn RecordStore>>,
    tracker: Arc<ConversionTracker>,
    config: SyncConfig,
}

impl SyncSession {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageProvider>,
        config: SyncConfig,
    ) -> Self {
        let tracker = Arc::new(ConversionTracker::new(Arc::clone(&storage), config.clone()));
        Self {
            identity,
            storage,
            records: None,
            tracker,
            config,
        }
    }

    /// Build a session whose tracker reads durable conversion records before
    /// falling back to artifact-listing inference.
    pub fn with_record_store(
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageProvider>,
        records: Arc<dyn RecordStore>,
        config: SyncConfig,
    ) -> Self {
        let tracker = Arc::new(
            ConversionTracker::new(Arc::clone(&storage), config.clone())
                .with_record_store(Arc::clone(&records)),
        );
        Self {
            identity,
            storage,
            records: Some(records),
            tracker,
            config,
        }
    }

    /// The tracker backing this session.
    pub fn tracker(&self) -> Arc<ConversionTracker> {
        Arc::clone(&self.tracker)
    }

    fn principal(&self) -> Result<Principal, SyncError> {
        self.identity.current_principal().ok_or(SyncError::SignedOut)
    }

    /// Upload an EPUB under the exact user-supplied file name and start
    /// tracking its conversion.
    ///
    /// The document appears `Pending` in the view before this function
    /// returns, so the UI shows "in progress" without waiting for a listing
    /// to catch up.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<(), SyncError> {
        let principal = self.principal()?;

        if file_name.trim().is_empty() || file_name.contains('/') {
            return Err(SyncError::InvalidInput {
                reason: format!("'{file_name}' is not a valid upload name"),
            });
        }
        if bytes.len() < EPUB_MAGIC.len() || bytes[..EPUB_MAGIC.len()] != EPUB_MAGIC {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(SyncError::NotAnEpub {
                name: file_name.to_string(),
                magic,
            });
        }

        let key = Namespace::new(&principal).document_key(file_name);
        self.storage
            .put(&key, bytes, self.config.overwrite_uploads)
            .await
            .map_err(|source| SyncError::UploadFailed {
                name: file_name.to_string(),
                source,
            })?;
        info!("uploaded '{}' ({} bytes)", file_name, bytes.len());

        // Seed the durable record when a store is configured. Failure here
        // is non-fatal: the optimistic tracked entry covers the gap and the
        // worker will upsert its own states.
        if let Some(records) = &self.records {
            if let Err(e) = records
                .upsert(&principal, ConversionRecord::queued(file_name))
                .await
            {
                warn!("failed to seed conversion record for '{}': {e}", file_name);
            }
        }

        self.tracker.record_optimistic_upload(file_name)
    }

    /// Reconcile once and return the updated view.
    pub async fn refresh(&self) -> Result<Vec<Document>, SyncError> {
        let principal = self.principal()?;
        Ok(self.tracker.reconcile(&principal).await)
    }

    /// The current view, without touching storage.
    pub fn documents(&self) -> Vec<Document> {
        self.tracker.view()
    }

    /// Download the narrated audio derived from `source_name`.
    ///
    /// Absence maps to [`SyncError::ArtifactNotReady`] — the caller is
    /// simply early, not broken.
    pub async fn fetch_artifact(&self, source_name: &str) -> Result<Vec<u8>, SyncError> {
        let principal = self.principal()?;
        let artifact = derive_artifact_name_with(
            source_name,
            &self.config.source_extension,
            &self.config.artifact_extension,
        );
        let key = Namespace::new(&principal).artifact_key(&artifact);

        match self.storage.get(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::NotFound { .. }) => Err(SyncError::ArtifactNotReady {
                name: source_name.to_string(),
            }),
            Err(source) => Err(SyncError::DownloadFailed { key, source }),
        }
    }

    /// Start the background poll loop, reporting progress to `observer`.
    ///
    /// The poller stops itself once every tracked conversion has resolved;
    /// call [`Poller::stop`] for early teardown.
    pub fn watch(&self, observer: ObserverHandle) -> Result<Poller, SyncError> {
        let principal = self.principal()?;
        Ok(Poller::spawn(
            self.tracker(),
            principal,
            observer,
            self.config.poll_interval(),
        ))
    }

    /// Stream one view per reconciliation until the tracked set drains.
    pub fn watch_stream(&self) -> Result<ViewStream, SyncError> {
        let principal = self.principal()?;
        Ok(watch_stream(
            self.tracker(),
            principal,
            self.config.poll_interval(),
        ))
    }
}
