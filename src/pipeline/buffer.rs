use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::types::Chunk;

/// Default upper bound on how long a consumer waits before re-polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Unbounded hand-off between producer tasks and a single consumer stage.
///
/// Producers never block. The consumer is woken on insert, and otherwise
/// re-polls at a fixed interval so it can observe cancellation between polls.
#[derive(Clone)]
pub struct HandoffBuffer {
    queue: Arc<Mutex<VecDeque<Chunk>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl HandoffBuffer {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    pub fn insert(&self, chunk: Chunk) {
        self.queue.lock().push_back(chunk);
        self.notify.notify_one();
    }

    pub fn try_take(&self) -> Option<Chunk> {
        self.queue.lock().pop_front()
    }

    /// Mark that no more chunks will be inserted. Pending chunks can still
    /// be taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next chunk.
    ///
    /// Returns `None` once `cancel` fires, or once the buffer is closed and
    /// fully drained.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<Chunk> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            // Read the flag before polling so a close racing with the last
            // insert cannot strand a chunk.
            let closed = self.is_closed();
            if let Some(chunk) = self.try_take() {
                return Some(chunk);
            }
            if closed {
                return None;
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

impl Default for HandoffBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
