//! Poller scheduling behaviour under paused tokio time: tick spacing,
//! re-entrancy, self-stop on drain, explicit stop, and the push-notification
//! fallback.

use readsai_sync::{
    ConversionTracker, MemoryStorage, Namespace, Poller, Principal, SyncConfig, SyncObserver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn principal() -> Principal {
    Principal::new("alice@example.com")
}

fn ns() -> Namespace {
    Namespace::new(&principal())
}

fn tracker(storage: &Arc<MemoryStorage>) -> Arc<ConversionTracker> {
    Arc::new(ConversionTracker::new(
        Arc::clone(storage) as _,
        SyncConfig::default(),
    ))
}

#[derive(Default)]
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

fn counting() -> Arc<CountingObserver> {
    Arc::new(CountingObserver::default())
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn resolves_conversion_then_stops_itself() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    tracker.record_optimistic_upload("book1.epub").unwrap();
    storage.insert(ns().document_key("book1.epub"), b"epub".to_vec());
    storage.insert(ns().artifact_key("book1.mp3"), b"audio".to_vec());

    let observer = counting();
    let poller = Poller::spawn(
        Arc::clone(&tracker),
        principal(),
        observer.clone() as _,
        Duration::from_millis(100),
    );

    // First tick resolves the conversion, next tick notices the drained set.
    poller.join().await;

    assert!(!tracker.is_pending("book1.epub"));
    assert_eq!(observer.ready.load(Ordering::SeqCst), 1);
    assert_eq!(observer.drained.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_tracked_set_stops_without_polling() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    let observer = counting();
    let poller = Poller::spawn(
        tracker,
        principal(),
        observer.clone() as _,
        Duration::from_millis(100),
    );
    poller.join().await;

    assert_eq!(observer.polls.load(Ordering::SeqCst), 0);
    assert_eq!(observer.drained.load(Ordering::SeqCst), 1);
}

// ── Tick spacing ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polls_at_most_once_per_interval() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    // Artifact never appears; the poller keeps polling.
    tracker.record_optimistic_upload("book1.epub").unwrap();
    storage.insert(ns().document_key("book1.epub"), b"epub".to_vec());

    let observer = counting();
    let poller = Poller::spawn(
        Arc::clone(&tracker),
        principal(),
        observer.clone() as _,
        Duration::from_secs(1),
    );

    // 3.5 simulated seconds cover the immediate tick plus three intervals.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let polls = observer.polls.load(Ordering::SeqCst);
    assert!(
        (3..=4).contains(&polls),
        "expected ~4 polls in 3.5 intervals, got {polls}"
    );

    poller.stop();
}

// ── Explicit stop ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn no_polls_after_stop_returns() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    tracker.record_optimistic_upload("book1.epub").unwrap();
    storage.insert(ns().document_key("book1.epub"), b"epub".to_vec());

    let observer = counting();
    let poller = Poller::spawn(
        Arc::clone(&tracker),
        principal(),
        observer.clone() as _,
        Duration::from_millis(100),
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    poller.stop();
    let frozen = observer.polls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(observer.polls.load(Ordering::SeqCst), frozen);
    assert!(!poller.is_running());

    // Stop is idempotent, including on an already-stopped poller.
    poller.stop();
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_after_self_stop_is_a_noop() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    let observer = counting();
    let poller = Poller::spawn(
        tracker,
        principal(),
        observer.clone() as _,
        Duration::from_millis(100),
    );

    // Let the loop notice the empty tracked set and finish on its own.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!poller.is_running());
    poller.stop();
    assert_eq!(observer.drained.load(Ordering::SeqCst), 1);
}

// ── Push notifications ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn notification_triggers_poll_before_next_interval() {
    let storage = Arc::new(MemoryStorage::new());
    let tracker = tracker(&storage);

    tracker.record_optimistic_upload("book1.epub").unwrap();
    storage.insert(ns().document_key("book1.epub"), b"epub".to_vec());

    let (tx, rx) = mpsc::channel(4);
    let observer = counting();
    let poller = Poller::spawn_with_notifications(
        Arc::clone(&tracker),
        principal(),
        observer.clone() as _,
        Duration::from_secs(60),
        rx,
    );

    // The immediate first tick.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(observer.polls.load(Ordering::SeqCst), 1);

    // A push notification polls well before the 60 s interval elapses.
    tx.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(observer.polls.load(Ordering::SeqCst), 2);

    // Channel closure degrades to interval polling.
    drop(tx);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(observer.polls.load(Ordering::SeqCst) >= 3);

    poller.stop();
}
