//! The polling scheduler: a cancellable interval loop that drives
//! reconciliation while anything is still converting.
//!
//! ## Lifecycle
//!
//! [`Poller::spawn`] starts a background task that reconciles every
//! `poll_interval` while the tracked set is non-empty. When the set drains,
//! the loop notices at its next scheduled tick and stops itself — no
//! external caller has to cancel it. [`Poller::stop`] is honoured at any
//! time for teardown, is idempotent, and is safe when the loop has already
//! finished.
//!
//! ## Re-entrancy
//!
//! Reconciliation is awaited inline in the loop body, so two reconciles can
//! never overlap; if one outlasts the interval, the missed ticks are skipped
//! ([`MissedTickBehavior::Skip`]) rather than queued. This bounds storage
//! traffic to at most one in-flight reconcile regardless of how slow the
//! network is.
//!
//! ## Push notifications
//!
//! [`Poller::spawn_with_notifications`] additionally listens on an mpsc
//! channel; each message triggers an immediate reconcile through the same
//! guarded loop body. When the channel closes the poller degrades to pure
//! interval polling.

use crate::identity::Principal;
use crate::observer::ObserverHandle;
use crate::tracker::{ConversionStatus, ConversionTracker, Document};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Handle to a running poll loop.
#[derive(Debug)]
pub struct Poller {
    stopped: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Start polling `tracker` for `principal` every `period`.
    ///
    /// The first reconcile runs immediately; subsequent ones follow at
    /// `period` spacing.
    pub fn spawn(
        tracker: Arc<ConversionTracker>,
        principal: Principal,
        observer: ObserverHandle,
        period: Duration,
    ) -> Self {
        Self::spawn_inner(tracker, principal, observer, period, None)
    }

    /// Like [`Poller::spawn`], with a push channel: every received `()`
    /// triggers an immediate reconcile in addition to the interval ticks.
    pub fn spawn_with_notifications(
        tracker: Arc<ConversionTracker>,
        principal: Principal,
        observer: ObserverHandle,
        period: Duration,
        notifications: mpsc::Receiver<()>,
    ) -> Self {
        Self::spawn_inner(tracker, principal, observer, period, Some(notifications))
    }

    fn spawn_inner(
        tracker: Arc<ConversionTracker>,
        principal: Principal,
        observer: ObserverHandle,
        period: Duration,
        notifications: Option<mpsc::Receiver<()>>,
    ) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stopped);

        info!(
            "starting poller for '{}' (interval: {:?})",
            principal, period
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut notifications = notifications;
            // Last emitted status per name, to fire observer events on
            // transitions only.
            let mut last_seen: HashMap<String, ConversionStatus> = HashMap::new();

            loop {
                let mut channel_closed = false;
                match notifications.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            _ = ticker.tick() => {}
                            msg = rx.recv() => {
                                match msg {
                                    Some(()) => debug!("push notification received"),
                                    None => channel_closed = true,
                                }
                            }
                        }
                    }
                    None => {
                        ticker.tick().await;
                    }
                }
                if channel_closed {
                    debug!("notification channel closed, falling back to interval polling");
                    notifications = None;
                    continue;
                }

                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                if !tracker.has_pending() {
                    debug!("tracked set drained, poller stopping");
                    observer.on_drained();
                    break;
                }

                observer.on_poll_start(tracker.pending_count());
                let view = tracker.reconcile(&principal).await;
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                emit_transitions(&observer, &mut last_seen, &view);
                observer.on_view(&view);
            }
        });

        Self {
            stopped,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the loop. No new tick begins after this returns; an in-flight
    /// reconciliation is cancelled at its next await point. Safe to call
    /// multiple times and after the loop has already stopped itself.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.lock_handle().take() {
            handle.abort();
        }
    }

    /// True while the poll task is still running.
    pub fn is_running(&self) -> bool {
        self.lock_handle()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the loop to finish (self-stop on drain, or [`Poller::stop`]
    /// from another task).
    pub async fn join(self) {
        let handle = self.lock_handle().take();
        if let Some(handle) = handle {
            // JoinError from an abort is expected during teardown.
            let _ = handle.await;
        }
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().expect("poller lock poisoned")
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.lock_handle().take() {
            handle.abort();
        }
    }
}

/// Fire per-name observer events for status transitions since the last view.
fn emit_transitions(
    observer: &ObserverHandle,
    last_seen: &mut HashMap<String, ConversionStatus>,
    view: &[Document],
) {
    for doc in view {
        let previous = last_seen.insert(doc.name.clone(), doc.status);
        if previous == Some(doc.status) {
            continue;
        }
        match doc.status {
            ConversionStatus::Ready => observer.on_ready(&doc.name),
            ConversionStatus::Failed => {
                observer.on_failed(&doc.name, doc.failure_detail.as_deref().unwrap_or("unknown"))
            }
            ConversionStatus::Stalled => observer.on_stalled(&doc.name),
            ConversionStatus::Pending => {}
        }
    }
}
