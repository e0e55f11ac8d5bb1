//! Durable conversion records: the server-authoritative state machine that
//! blob-listing inference stands in for.
//!
//! A [`ConversionRecord`] is written by the upload path (`queued`) and
//! advanced by the external conversion worker (`processing`, then `ready` or
//! `failed`). When a [`RecordStore`] is configured, the tracker reads records
//! first and only falls back to artifact-listing inference for documents that
//! have no record — which makes reconciliation a read-through cache rather
//! than an inference engine, and lets a failed conversion surface as `failed`
//! instead of pending forever.
//!
//! Without a record store the tracker behaves exactly as the blob-inference
//! compatibility path describes: artifact present = ready, absent = pending.

use crate::error::StorageError;
use crate::identity::Principal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle state of a conversion, owned by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    /// Upload accepted; no worker has picked it up yet.
    Queued,
    /// A worker is producing the audio artifact.
    Processing,
    /// The artifact exists and is downloadable.
    Ready,
    /// The worker gave up; see [`ConversionRecord::detail`].
    Failed,
}

impl ConversionState {
    /// True once the record will no longer advance on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionState::Ready | ConversionState::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Failed → Queued` is the retry edge; everything else moves strictly
    /// forward. Same-state transitions are allowed so upserts are idempotent.
    pub fn can_transition_to(&self, next: ConversionState) -> bool {
        use ConversionState::*;
        matches!(
            (self, next),
            (Queued, Queued)
                | (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
                | (Failed, Queued)
                | (Failed, Failed)
                | (Ready, Ready)
        )
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversionState::Queued => "queued",
            ConversionState::Processing => "processing",
            ConversionState::Ready => "ready",
            ConversionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One conversion's durable status entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Name of the uploaded source document this record describes.
    pub source_name: String,
    /// Current lifecycle state.
    pub state: ConversionState,
    /// Worker-supplied failure reason, present when `state` is `Failed`.
    pub detail: Option<String>,
    /// Seconds since the Unix epoch at the last state change.
    pub updated_at_epoch_secs: Option<u64>,
}

impl ConversionRecord {
    /// A fresh `Queued` record stamped with the current time, as written by
    /// the upload path.
    pub fn queued(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            state: ConversionState::Queued,
            detail: None,
            updated_at_epoch_secs: now_epoch_secs(),
        }
    }
}

fn now_epoch_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Capability interface over the conversion-record backing store.
///
/// Implementations are expected to be principal-scoped the same way storage
/// keys are. The state machine itself is enforced server-side; clients use
/// [`ConversionState::can_transition_to`] only to validate what they are
/// about to request.
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Fetch the record for `source_name`, or `None` when the store has
    /// never seen that document.
    async fn fetch(
        &self,
        principal: &Principal,
        source_name: &str,
    ) -> Result<Option<ConversionRecord>, StorageError>;

    /// Insert or replace the record for `record.source_name`.
    async fn upsert(
        &self,
        principal: &Principal,
        record: ConversionRecord,
    ) -> Result<(), StorageError>;
}

/// In-memory [`RecordStore`] for tests and single-process demos.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<(String, String), ConversionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch(
        &self,
        principal: &Principal,
        source_name: &str,
    ) -> Result<Option<ConversionRecord>, StorageError> {
        let records = self.records.lock().expect("record lock poisoned");
        Ok(records
            .get(&(principal.as_str().to_string(), source_name.to_string()))
            .cloned())
    }

    async fn upsert(
        &self,
        principal: &Principal,
        record: ConversionRecord,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().expect("record lock poisoned");
        records.insert(
            (principal.as_str().to_string(), record.source_name.clone()),
            record,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        use ConversionState::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Queued));
    }

    #[test]
    fn backward_transitions_rejected() {
        use ConversionState::*;
        assert!(!Ready.can_transition_to(Processing));
        assert!(!Ready.can_transition_to(Queued));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Ready), "queued must pass through processing");
    }

    #[test]
    fn terminal_states() {
        assert!(ConversionState::Ready.is_terminal());
        assert!(ConversionState::Failed.is_terminal());
        assert!(!ConversionState::Queued.is_terminal());
        assert!(!ConversionState::Processing.is_terminal());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryRecordStore::new();
        let alice = Principal::new("alice@example.com");
        let bob = Principal::new("bob@example.com");

        assert_eq!(store.fetch(&alice, "book1.epub").await.unwrap(), None);

        store
            .upsert(&alice, ConversionRecord::queued("book1.epub"))
            .await
            .unwrap();

        let rec = store.fetch(&alice, "book1.epub").await.unwrap().unwrap();
        assert_eq!(rec.state, ConversionState::Queued);

        // Records are principal-scoped.
        assert_eq!(store.fetch(&bob, "book1.epub").await.unwrap(), None);
    }

    #[test]
    fn queued_record_is_stamped() {
        let rec = ConversionRecord::queued("book1.epub");
        assert_eq!(rec.state, ConversionState::Queued);
        assert!(rec.updated_at_epoch_secs.is_some());
        assert!(rec.detail.is_none());
    }

    #[test]
    fn state_serialises_snake_case() {
        let json = serde_json::to_string(&ConversionState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
