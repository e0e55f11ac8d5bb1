//! Error types for the readsai-sync library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StorageError`] — **Per-operation**: the outcome of a single object-store
//!   call. `NotFound` is not a failure at all — an absent artifact is the
//!   normal "conversion still pending" signal. `Unavailable` is transient and
//!   is retried on the next poll tick; the tracker absorbs it without touching
//!   its optimistic state.
//!
//! * [`SyncError`] — **Fatal**: the session-level operation cannot proceed at
//!   all (nobody signed in, the upload is not an EPUB, the configuration is
//!   invalid). Returned as `Err(SyncError)` from [`crate::session::SyncSession`]
//!   entry points.
//!
//! The separation keeps the reconciliation loop total: `reconcile` never
//! propagates a `StorageError` upward, so a network blip can never corrupt the
//! in-progress view the user is looking at.

use thiserror::Error;

/// Outcome classification for a single storage operation.
///
/// The taxonomy is deliberately small: absence is expected, collision is
/// caller-resolvable, and everything else is a transient transport condition
/// that the next poll tick retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// No object exists at the requested key.
    ///
    /// For artifact keys this is the ordinary "not converted yet" answer,
    /// not a fault.
    #[error("object not found: '{key}'")]
    NotFound { key: String },

    /// An object already exists at the key and `overwrite` was false.
    #[error("object already exists: '{key}'\nPass overwrite = true to replace it.")]
    AlreadyExists { key: String },

    /// The storage service could not be reached or answered abnormally.
    ///
    /// Transient by contract: callers leave their state unchanged and retry
    /// on the next poll tick.
    #[error("storage unavailable: {detail}")]
    Unavailable { detail: String },
}

impl StorageError {
    /// Shorthand for [`StorageError::Unavailable`].
    pub fn unavailable(detail: impl Into<String>) -> Self {
        StorageError::Unavailable {
            detail: detail.into(),
        }
    }

    /// True for errors that a later retry may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

/// All fatal errors returned by the readsai-sync library.
///
/// Reconciliation failures never appear here: `reconcile` logs storage
/// trouble and returns the last known view instead (see [`StorageError`]).
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Identity errors ───────────────────────────────────────────────────
    /// No principal is currently signed in.
    #[error("no principal is signed in\nSign in before uploading or reconciling.")]
    SignedOut,

    // ── Input errors ──────────────────────────────────────────────────────
    /// A document name was rejected before any state was mutated.
    #[error("invalid document name: {reason}")]
    InvalidInput { reason: String },

    /// The uploaded bytes are not an EPUB container.
    #[error("'{name}' is not a valid EPUB file\nFirst bytes: {magic:?}")]
    NotAnEpub { name: String, magic: [u8; 4] },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The document upload itself failed.
    #[error("failed to upload '{name}': {source}")]
    UploadFailed {
        name: String,
        #[source]
        source: StorageError,
    },

    /// The derived artifact is not in storage yet.
    #[error("audio for '{name}' is not ready yet\nRun `readsai watch` to poll until the conversion completes.")]
    ArtifactNotReady { name: String },

    /// Downloading an artifact failed for a reason other than absence.
    #[error("failed to download '{key}': {source}")]
    DownloadFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
