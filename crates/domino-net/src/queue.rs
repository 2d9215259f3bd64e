//! FIFO of encoded frames waiting for the connection to open.

use std::collections::VecDeque;

/// Bounded queue of outgoing frames held while the connection is down.
///
/// Frames are flushed oldest first once the connection opens. A frame whose
/// send fails goes back to the front so ordering is kept.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
    capacity: usize,
}

impl OutboundQueue {
    /// An empty queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a frame. Returns `false` if the queue is full.
    pub fn enqueue(&mut self, frame: String) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    /// Put a frame back at the head after a failed send. Always accepted,
    /// the frame already counted against the capacity once.
    pub fn requeue_front(&mut self, frame: String) {
        self.frames.push_front(frame);
    }

    /// Take the oldest frame.
    pub fn pop_front(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Frames currently queued, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(String::as_str)
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether another `enqueue` would be refused.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Maximum number of frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
