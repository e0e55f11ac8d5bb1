//! Observer trait for poll-loop events.
//!
//! Inject an `Arc<dyn SyncObserver>` into [`crate::poller::Poller::spawn`]
//! (or [`crate::session::SyncSession::watch`]) to receive events as the
//! reconciliation loop runs. The callback approach is the least-invasive
//! integration point: callers can forward events to a progress bar, a UI
//! channel, or a log sink without the library knowing anything about how the
//! host application communicates. All methods have default no-op
//! implementations so callers only override what they care about.

use crate::tracker::Document;
use std::sync::Arc;

/// Called by the poller as the reconciliation loop progresses.
///
/// Implementations must be `Send + Sync`; the poller runs on a spawned task.
/// Per-name events fire on transitions only — `on_stalled` fires once when a
/// document crosses the stall threshold, not on every subsequent tick.
pub trait SyncObserver: Send + Sync {
    /// Called before each reconciliation with the tracked-name count.
    fn on_poll_start(&self, pending: usize) {
        let _ = pending;
    }

    /// Called after each reconciliation with the updated read model.
    fn on_view(&self, documents: &[Document]) {
        let _ = documents;
    }

    /// Called when a document's artifact (or ready record) is first observed.
    fn on_ready(&self, name: &str) {
        let _ = name;
    }

    /// Called when a durable record first reports a failed conversion.
    fn on_failed(&self, name: &str, detail: &str) {
        let _ = (name, detail);
    }

    /// Called when a document first crosses the stall threshold.
    fn on_stalled(&self, name: &str) {
        let _ = name;
    }

    /// Called once when the tracked set drains and the poller stops itself.
    fn on_drained(&self) {}
}

/// A no-op implementation for callers that don't need poll events.
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Convenience alias matching the type the poller stores.
pub type ObserverHandle = Arc<dyn SyncObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ConversionStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        polls: AtomicUsize,
        ready: AtomicUsize,
        drained: AtomicUsize,
    }

    impl SyncObserver for CountingObserver {
        fn on_poll_start(&self, _pending: usize) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
        fn on_ready(&self, _name: &str) {
            self.ready.fetch_add(1, Ordering::SeqCst);
        }
        fn on_drained(&self) {
            self.drained.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let doc = Document {
            name: "book1.epub".into(),
            size: None,
            updated_at: None,
            status: ConversionStatus::Pending,
            failure_detail: None,
        };
        let observer = NoopObserver;
        observer.on_poll_start(1);
        observer.on_view(&[doc]);
        observer.on_ready("book1.epub");
        observer.on_failed("book1.epub", "worker crashed");
        observer.on_stalled("book1.epub");
        observer.on_drained();
    }

    #[test]
    fn counting_observer_receives_events() {
        let observer = CountingObserver {
            polls: AtomicUsize::new(0),
            ready: AtomicUsize::new(0),
            drained: AtomicUsize::new(0),
        };
        observer.on_poll_start(2);
        observer.on_ready("a.epub");
        observer.on_ready("b.epub");
        observer.on_drained();

        assert_eq!(observer.polls.load(Ordering::SeqCst), 1);
        assert_eq!(observer.ready.load(Ordering::SeqCst), 2);
        assert_eq!(observer.drained.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let observer: ObserverHandle = Arc::new(NoopObserver);
        observer.on_poll_start(3);
        observer.on_drained();
    }
}
