use crate::dom::{Document, NodeId};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Handle to the spawned validation loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Lets a check through at most once per interval.
#[derive(Debug)]
pub(crate) struct RateLimit {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimit {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True if a check is due at `now`; records it as done.
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

/// Whether the node's box touches the viewport grown by `margin` on every side.
///
/// `None` when the document has no geometry for the node.
pub(crate) fn near_viewport(doc: &dyn Document, node: NodeId, margin: f64) -> Option<bool> {
    let rect = doc.rect(node)?;
    Some(rect.intersects(&doc.viewport().rect().expand(margin)))
}
