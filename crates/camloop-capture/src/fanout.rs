//! Single-producer, multi-subscriber frame fan-out.
//!
//! Every subscriber owns its own bounded [`FrameBuffer`]. The dispatcher
//! hands each published frame to every subscriber by cloning the `Arc`, so
//! consumers never compete for the same frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::buffer::FrameBuffer;
use crate::frame::SharedFrame;

struct SubscriberEntry {
    id: u64,
    name: String,
    buffer: Arc<FrameBuffer>,
}

/// Distributes produced frames to every active subscription.
pub struct FrameDispatcher {
    subscribers: RwLock<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl FrameDispatcher {
    /// Create a dispatcher with no subscribers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            published: AtomicU64::new(0),
        })
    }

    /// Register a new subscriber with its own buffer of `capacity` frames.
    ///
    /// The subscriber only sees frames published after this call.
    pub fn subscribe(self: &Arc<Self>, name: &str, capacity: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(FrameBuffer::new(capacity));

        self.subscribers.write().push(SubscriberEntry {
            id,
            name: name.to_string(),
            buffer: Arc::clone(&buffer),
        });
        debug!(subscriber = name, capacity, "Subscriber added");

        Subscription {
            id,
            name: name.to_string(),
            buffer,
            dispatcher: Arc::downgrade(self),
        }
    }

    /// Hand `frame` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, frame: SharedFrame) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.subscribers.read();
        subscribers
            .iter()
            .filter(|entry| entry.buffer.push(Arc::clone(&frame)))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Names of the active subscribers, in subscription order.
    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Frames published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(pos) = subscribers.iter().position(|entry| entry.id == id) {
            let entry = subscribers.remove(pos);
            debug!(subscriber = %entry.name, "Subscriber removed");
        }
    }
}

/// A consumer's view of the fan-out. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    name: String,
    buffer: Arc<FrameBuffer>,
    dispatcher: Weak<FrameDispatcher>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Shared handle to the buffer, for reading counters after the
    /// subscription moved into a worker.
    pub fn shared_buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn pop_front(&self) -> Option<SharedFrame> {
        self.buffer.pop_front()
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<SharedFrame> {
        self.buffer.pop_timeout(timeout)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Frames this subscriber missed because its buffer was full.
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unsubscribe(self.id);
        }
    }
}
