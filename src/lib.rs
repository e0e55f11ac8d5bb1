//! # readsai-sync
//!
//! Conversion-state synchronization client for the ReadsAI document-to-audio
//! service.
//!
//! ## Why this crate?
//!
//! A ReadsAI client uploads an EPUB and an external worker eventually writes
//! a narrated audio track next to it. There is no authoritative conversion
//! record to query — the only signals available to a client are the object
//! listings of its own namespace. This crate turns those signals into a
//! consistent "ready / pending" view: it records uploads optimistically the
//! instant they are initiated, then reconciles against storage listings on a
//! cancellable poll loop until every conversion has resolved.
//!
//! ## Sync Loop Overview
//!
//! ```text
//! upload book1.epub
//!  │
//!  ├─ 1. Put       write {principal}/documents/book1.epub
//!  ├─ 2. Track     record_optimistic_upload → view shows "pending" instantly
//!  ├─ 3. Poll      every interval: list documents, check artifacts
//!  │               (records first, when a record store is configured)
//!  ├─ 4. Observe   {principal}/artifacts/book1.mp3 appears
//!  └─ 5. Resolve   untrack book1.epub → view shows "ready" → poller stops
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use readsai_sync::{FsStorage, StaticIdentity, SyncConfig, SyncSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SyncSession::new(
//!         Arc::new(StaticIdentity::signed_in("alice@example.com")),
//!         Arc::new(FsStorage::new("./readsai-data")),
//!         SyncConfig::default(),
//!     );
//!
//!     let epub = std::fs::read("book1.epub")?;
//!     session.upload("book1.epub", &epub).await?;
//!
//!     // One reconcile; use session.watch(...) or session.watch_stream()
//!     // to poll until the conversion completes.
//!     for doc in session.refresh().await? {
//!         println!("{:12} {:?}", doc.name, doc.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `readsai` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! readsai-sync = { version = "0.4", default-features = false }
//! ```
//!
//! ## Guarantees
//!
//! * An upload shows `Pending` in the view before the upload round-trip
//!   completes, and exactly once regardless of repeated recording.
//! * A transient storage failure never clears tracked state — the next poll
//!   tick simply retries.
//! * At most one reconciliation is in flight at any time; slow networks skip
//!   ticks instead of stacking requests.
//! * The poll loop stops itself once the tracked set drains, and `stop()`
//!   tears it down at any time.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod identity;
pub mod naming;
pub mod observer;
pub mod poller;
pub mod record;
pub mod session;
pub mod storage;
pub mod stream;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{StorageError, SyncError};
pub use identity::{IdentityProvider, Principal, StaticIdentity};
pub use naming::{derive_artifact_name, derive_artifact_name_with};
pub use observer::{NoopObserver, ObserverHandle, SyncObserver};
pub use poller::Poller;
pub use record::{ConversionRecord, ConversionState, MemoryRecordStore, RecordStore};
pub use session::SyncSession;
pub use storage::{FsStorage, HttpStorage, MemoryStorage, Namespace, ObjectEntry, StorageProvider};
pub use stream::{watch_stream, ViewStream};
pub use tracker::{ConversionStatus, ConversionTracker, Document};
