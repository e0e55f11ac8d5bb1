//! Streaming view API: yield the read model after every reconciliation.
//!
//! The poller + observer pairing suits callback-style UIs; a `Stream` suits
//! `while let` consumers and combinator pipelines. [`watch_stream`] produces
//! one `Vec<Document>` per reconciliation and terminates once the tracked
//! set has drained, so the final item is the view in which the last
//! conversion completed.
//!
//! Reconciliations are sequential by construction — the next poll is not
//! started until the consumer has taken the previous item — which gives the
//! same no-overlap guarantee as the poller's tick skipping.

use crate::identity::Principal;
use crate::tracker::{ConversionTracker, Document};
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;

/// A boxed stream of document views.
pub type ViewStream = Pin<Box<dyn Stream<Item = Vec<Document>> + Send>>;

/// Reconcile every `period` and yield the resulting view, until the tracked
/// set is empty.
///
/// The first reconcile runs immediately. A tracker with nothing pending
/// yields an empty stream.
pub fn watch_stream(
    tracker: Arc<ConversionTracker>,
    principal: Principal,
    period: Duration,
) -> ViewStream {
    let s = stream::unfold(
        (tracker, principal, true),
        move |(tracker, principal, first)| async move {
            if !tracker.has_pending() {
                return None;
            }
            if !first {
                tokio::time::sleep(period).await;
            }
            let view = tracker.reconcile(&principal).await;
            Some((view, (tracker, principal, false)))
        },
    );
    Box::pin(s)
}
