//! The conversion tracker: optimistic local state reconciled against
//! storage listings.
//!
//! The client owns no authoritative conversion record. What it has is
//! (a) the principal's document listing, (b) the artifact naming rule, and
//! (c) a locally-held set of names "believed still converting" that is
//! populated the instant an upload is initiated. [`ConversionTracker`]
//! reconciles those three inputs into the `{name, status}` read model the
//! presentation layer renders.
//!
//! ## Reconciliation
//!
//! One [`ConversionTracker::reconcile`] call:
//!
//! 1. lists the principal's documents (ground truth for what exists);
//! 2. merges the listing with locally recorded names the listing does not
//!    show yet, de-duplicated by name, preferring the richer storage entry;
//! 3. resolves each document's status — durable records first when a
//!    [`RecordStore`] is configured, otherwise an artifact-presence check
//!    issued concurrently per name behind a wait-for-all barrier;
//! 4. removes every name whose artifact (or `ready`/`failed` record) was
//!    observed from the tracked set.
//!
//! Storage failures are soft: the tracker logs them, leaves the tracked set
//! untouched, and returns the last known view, so a transient network issue
//! can never falsely declare a conversion complete.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::identity::Principal;
use crate::naming::derive_artifact_name_with;
use crate::record::{ConversionState, RecordStore};
use crate::storage::{Namespace, StorageProvider};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Resolved conversion status of one document, as rendered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// The derived artifact exists and can be downloaded.
    Ready,
    /// Conversion has not been observed to complete yet.
    Pending,
    /// Pending for longer than the configured stall threshold.
    Stalled,
    /// A durable record reports the conversion failed.
    Failed,
}

impl ConversionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConversionStatus::Ready)
    }
}

/// One uploaded source document with its resolved status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// File name, unique within the principal's namespace.
    pub name: String,
    /// Size in bytes, when storage has reported it.
    pub size: Option<u64>,
    /// Backend-native last-modified timestamp, when storage has reported it.
    pub updated_at: Option<String>,
    /// Resolved conversion status.
    pub status: ConversionStatus,
    /// Worker-supplied reason, present when `status` is `Failed`.
    pub failure_detail: Option<String>,
}

impl Document {
    fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            updated_at: None,
            status: ConversionStatus::Pending,
            failure_detail: None,
        }
    }
}

#[derive(Debug)]
struct TrackedEntry {
    since: Instant,
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Ordered read model: listing entries first, local-only names after.
    documents: Vec<Document>,
    /// Names believed still converting, with the instant tracking began.
    tracked: HashMap<String, TrackedEntry>,
}

/// How one tracked name was settled by the record read-through.
enum Resolution {
    Ready,
    Failed(Option<String>),
    StillConverting,
}

/// Owns the tracked set and the document read model.
///
/// All mutation goes through [`record_optimistic_upload`] and
/// [`reconcile`]; external callers read through [`is_pending`] and the
/// returned views. The internal lock is only ever held for short synchronous
/// sections, never across storage I/O, so an optimistic insert landing while
/// a reconcile is in flight is never lost.
///
/// [`record_optimistic_upload`]: ConversionTracker::record_optimistic_upload
/// [`reconcile`]: ConversionTracker::reconcile
/// [`is_pending`]: ConversionTracker::is_pending
#[derive(Debug)]
pub struct ConversionTracker {
    storage: Arc<dyn StorageProvider>,
    records: Option<Arc<dyn RecordStore>>,
    config: SyncConfig,
    state: Mutex<TrackerState>,
}

impl ConversionTracker {
    pub fn new(storage: Arc<dyn StorageProvider>, config: SyncConfig) -> Self {
        Self {
            storage,
            records: None,
            config,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Consult `records` before falling back to artifact-listing inference.
    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Record an upload the instant it is initiated, before the upload or
    /// any conversion has completed.
    ///
    /// The document shows up `Pending` in the view immediately and stays
    /// tracked until a reconcile observes its artifact. Idempotent: repeat
    /// calls neither duplicate the document nor reset its tracking clock.
    pub fn record_optimistic_upload(&self, name: &str) -> Result<(), SyncError> {
        if name.trim().is_empty() {
            return Err(SyncError::InvalidInput {
                reason: "document name must be non-empty".into(),
            });
        }
        if name.contains('/') {
            return Err(SyncError::InvalidInput {
                reason: format!("document name must not contain '/': '{name}'"),
            });
        }

        let mut state = self.lock_state();
        if let Some(idx) = state.documents.iter().position(|d| d.name == name) {
            let doc = &mut state.documents[idx];
            doc.status = ConversionStatus::Pending;
            doc.failure_detail = None;
        } else {
            state.documents.push(Document::pending(name));
        }
        state
            .tracked
            .entry(name.to_string())
            .or_insert(TrackedEntry {
                since: Instant::now(),
            });
        info!("tracking upload '{}'", name);
        Ok(())
    }

    /// Whether `name` is still believed to be converting.
    pub fn is_pending(&self, name: &str) -> bool {
        self.lock_state().tracked.contains_key(name)
    }

    /// Number of tracked names.
    pub fn pending_count(&self) -> usize {
        self.lock_state().tracked.len()
    }

    /// True while the tracked set is non-empty (the poller's run condition).
    pub fn has_pending(&self) -> bool {
        !self.lock_state().tracked.is_empty()
    }

    /// The current read model, without touching storage.
    pub fn view(&self) -> Vec<Document> {
        self.lock_state().documents.clone()
    }

    /// Reconcile local state against storage and return the updated view.
    ///
    /// Never fails: any storage trouble is logged and absorbed, leaving the
    /// tracked set and the last known view unchanged so the next poll tick
    /// can retry.
    pub async fn reconcile(&self, principal: &Principal) -> Vec<Document> {
        let ns = Namespace::new(principal);

        // Ground truth first. Without a document listing there is nothing
        // safe to conclude, so keep the optimistic view as-is.
        let listed = match self.storage.list(&ns.document_prefix()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("document listing failed, keeping optimistic view: {e}");
                return self.view();
            }
        };

        let (local_docs, tracked_names) = {
            let state = self.lock_state();
            let names: HashSet<String> = state.tracked.keys().cloned().collect();
            (state.documents.clone(), names)
        };

        // Merge listing ∪ locally-recorded, de-duplicated by name. Listings
        // carry no ordering guarantee, so storage entries are sorted by name;
        // local-only names keep their insertion order after them.
        let mut merged: Vec<Document> = listed
            .iter()
            .filter_map(|e| {
                ns.document_name(&e.key).map(|name| Document {
                    name: name.to_string(),
                    size: e.size,
                    updated_at: e.updated_at.clone(),
                    status: ConversionStatus::Pending,
                    failure_detail: None,
                })
            })
            .collect();
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        merged.dedup_by(|a, b| a.name == b.name);
        let listed_names: HashSet<String> = merged.iter().map(|d| d.name.clone()).collect();
        for doc in &local_docs {
            if !listed_names.contains(&doc.name) {
                let mut doc = doc.clone();
                doc.status = ConversionStatus::Pending;
                doc.failure_detail = None;
                merged.push(doc);
            }
        }

        // Durable records settle tracked names first, when a store is
        // configured; names without a record fall back to blob inference.
        let resolutions = self.resolve_from_records(principal, &tracked_names).await;

        // Artifact-presence checks for everything records did not settle.
        // Independent per name, issued concurrently, merged behind a
        // wait-for-all barrier. The owned (name, key) pairs are collected up
        // front so the resulting future captures nothing borrowed from
        // `merged`/`resolutions` across the await (keeps the future `Send` for
        // spawn/boxing).
        let pending_checks: Vec<(String, String)> = merged
            .iter()
            .filter(|d| !resolutions.contains_key(&d.name))
            .map(|doc| {
                let key = ns.artifact_key(&derive_artifact_name_with(
                    &doc.name,
                    &self.config.source_extension,
                    &self.config.artifact_extension,
                ));
                (doc.name.clone(), key)
            })
            .collect();
        let checks: HashMap<String, Result<bool, crate::error::StorageError>> =
            stream::iter(pending_checks.into_iter().map(|(name, key)| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let present = storage.exists(&key).await;
                    (name, present)
                }
            }))
            .buffer_unordered(self.config.check_concurrency)
            .collect()
            .await;

        self.apply(merged, resolutions, checks, &local_docs)
    }

    async fn resolve_from_records(
        &self,
        principal: &Principal,
        tracked_names: &HashSet<String>,
    ) -> HashMap<String, Resolution> {
        let Some(records) = &self.records else {
            return HashMap::new();
        };

        let fetches = tracked_names.iter().map(|name| {
            let records = Arc::clone(records);
            async move { (name.clone(), records.fetch(principal, name).await) }
        });
        let mut resolutions = HashMap::new();
        for (name, fetched) in futures::future::join_all(fetches).await {
            match fetched {
                Ok(Some(record)) => {
                    let resolution = match record.state {
                        ConversionState::Ready => Resolution::Ready,
                        ConversionState::Failed => Resolution::Failed(record.detail),
                        ConversionState::Queued | ConversionState::Processing => {
                            Resolution::StillConverting
                        }
                    };
                    resolutions.insert(name, resolution);
                }
                // No record: this document predates the record store or was
                // uploaded by an older client. Blob inference covers it.
                Ok(None) => {}
                Err(e) => {
                    warn!("record fetch for '{}' failed, falling back to listing: {e}", name);
                }
            }
        }
        resolutions
    }

    /// Fold listing, record resolutions, and artifact checks into the new
    /// view, and drop observed-complete names from the tracked set.
    fn apply(
        &self,
        merged: Vec<Document>,
        resolutions: HashMap<String, Resolution>,
        checks: HashMap<String, Result<bool, crate::error::StorageError>>,
        snapshot: &[Document],
    ) -> Vec<Document> {
        let prior: HashMap<&str, &Document> =
            snapshot.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut state = self.lock_state();
        let mut docs = Vec::with_capacity(merged.len());

        for mut doc in merged {
            let name = doc.name.clone();
            match resolutions.get(&name) {
                Some(Resolution::Ready) => {
                    if state.tracked.remove(&name).is_some() {
                        info!("'{}' is ready (record)", name);
                    }
                    doc.status = ConversionStatus::Ready;
                }
                Some(Resolution::Failed(detail)) => {
                    if state.tracked.remove(&name).is_some() {
                        info!("conversion of '{}' failed: {:?}", name, detail);
                    }
                    doc.status = ConversionStatus::Failed;
                    doc.failure_detail = detail.clone();
                }
                Some(Resolution::StillConverting) => {
                    doc.status = self.pending_status(&state, &name);
                }
                None => match checks.get(&name) {
                    Some(Ok(true)) => {
                        if state.tracked.remove(&name).is_some() {
                            info!("'{}' is ready (artifact observed)", name);
                        }
                        doc.status = ConversionStatus::Ready;
                    }
                    Some(Ok(false)) => {
                        if state.tracked.contains_key(&name) {
                            doc.status = self.pending_status(&state, &name);
                        } else if let Some(p) = prior.get(name.as_str()) {
                            // Untracked and artifact absent: a previously
                            // observed terminal status stays sticky.
                            doc.status = match p.status {
                                ConversionStatus::Failed => ConversionStatus::Failed,
                                _ => ConversionStatus::Pending,
                            };
                            doc.failure_detail = p.failure_detail.clone();
                        }
                    }
                    Some(Err(e)) => {
                        // Soft failure: keep the prior status, keep tracking.
                        warn!("artifact check for '{}' failed: {e}", name);
                        if let Some(p) = prior.get(name.as_str()) {
                            doc.status = p.status;
                            doc.failure_detail = p.failure_detail.clone();
                        } else if state.tracked.contains_key(&name) {
                            doc.status = self.pending_status(&state, &name);
                        }
                    }
                    None => {
                        if let Some(p) = prior.get(name.as_str()) {
                            doc.status = p.status;
                            doc.failure_detail = p.failure_detail.clone();
                        }
                    }
                },
            }
            docs.push(doc);
        }

        // Names recorded while this reconcile's I/O was in flight are not in
        // the merged snapshot; carry them over untouched.
        let merged_names: HashSet<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        let late: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| !merged_names.contains(d.name.as_str()))
            .cloned()
            .collect();
        docs.extend(late);

        debug!(
            "reconcile: {} documents, {} still tracked",
            docs.len(),
            state.tracked.len()
        );
        state.documents = docs.clone();
        docs
    }

    fn pending_status(&self, state: &TrackerState, name: &str) -> ConversionStatus {
        match (self.config.stall_after(), state.tracked.get(name)) {
            (Some(threshold), Some(entry)) if entry.since.elapsed() >= threshold => {
                ConversionStatus::Stalled
            }
            _ => ConversionStatus::Pending,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("tracker lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConversionTracker {
        ConversionTracker::new(
            Arc::new(crate::storage::MemoryStorage::new()),
            SyncConfig::default(),
        )
    }

    #[test]
    fn empty_name_rejected_without_mutation() {
        let t = tracker();
        assert!(matches!(
            t.record_optimistic_upload(""),
            Err(SyncError::InvalidInput { .. })
        ));
        assert!(matches!(
            t.record_optimistic_upload("   "),
            Err(SyncError::InvalidInput { .. })
        ));
        assert!(t.view().is_empty());
        assert_eq!(t.pending_count(), 0);
    }

    #[test]
    fn slash_in_name_rejected() {
        let t = tracker();
        assert!(matches!(
            t.record_optimistic_upload("../escape.epub"),
            Err(SyncError::InvalidInput { .. })
        ));
        assert!(t.view().is_empty());
    }

    #[test]
    fn optimistic_upload_is_idempotent() {
        let t = tracker();
        t.record_optimistic_upload("book1.epub").unwrap();
        t.record_optimistic_upload("book1.epub").unwrap();

        assert!(t.is_pending("book1.epub"));
        let view = t.view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].name, "book1.epub");
        assert_eq!(view[0].status, ConversionStatus::Pending);
    }

    #[test]
    fn tracked_names_always_appear_in_view() {
        let t = tracker();
        for name in ["a.epub", "b.epub", "c.epub"] {
            t.record_optimistic_upload(name).unwrap();
        }
        let view_names: HashSet<String> = t.view().into_iter().map(|d| d.name).collect();
        for name in ["a.epub", "b.epub", "c.epub"] {
            assert!(t.is_pending(name));
            assert!(view_names.contains(name));
        }
    }
}
