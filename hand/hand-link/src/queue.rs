//! Bounded frame queue between the tracker and the sender.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hand_types::PoseFrame;
use tokio::sync::Notify;
use tracing::warn;

/// A bounded, drop-oldest queue of pose frames.
///
/// The tracker pushes at camera rate and never waits; the sender drains with
/// [`recv`](Self::recv). When full, the oldest frame is evicted so the
/// freshest pose always gets through.
///
/// # Example
///
/// ```
/// use hand_link::FrameQueue;
/// use hand_types::{PoseFrame, Timestamp};
///
/// let queue = FrameQueue::new(2);
/// queue.push(PoseFrame::empty(Timestamp::from_millis(0)));
/// queue.push(PoseFrame::empty(Timestamp::from_millis(33)));
/// queue.push(PoseFrame::empty(Timestamp::from_millis(66)));
///
/// assert_eq!(queue.len(), 2);
/// assert_eq!(queue.overflow_count(), 1);
/// assert_eq!(queue.pop().unwrap().timestamp, Timestamp::from_millis(33));
/// ```
#[derive(Debug)]
pub struct FrameQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueInner {
    frames: VecDeque<PoseFrame>,
    overflow: u64,
    closed: bool,
}

impl FrameQueue {
    /// Creates a queue. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity.min(1024)),
                ..QueueInner::default()
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Returns true if no frame is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Frames evicted because the queue was full.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.lock().overflow
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Enqueues a frame, evicting the oldest one if full.
    ///
    /// Returns the evicted frame. On a closed queue the pushed frame itself
    /// is returned and nothing is enqueued.
    pub fn push(&self, frame: PoseFrame) -> Option<PoseFrame> {
        let evicted = {
            let mut inner = self.lock();
            if inner.closed {
                return Some(frame);
            }
            let evicted = if inner.frames.len() >= self.capacity {
                inner.overflow += 1;
                inner.frames.pop_front()
            } else {
                None
            };
            inner.frames.push_back(frame);
            evicted
        };
        if let Some(old) = &evicted {
            warn!(timestamp = %old.timestamp, "frame queue full, oldest frame dropped");
        }
        self.notify.notify_one();
        evicted
    }

    /// Dequeues the oldest frame without waiting.
    pub fn pop(&self) -> Option<PoseFrame> {
        self.lock().frames.pop_front()
    }

    /// Waits for the next frame. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<PoseFrame> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stops accepting frames and wakes the receiver. Frames already queued
    /// are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }
}
