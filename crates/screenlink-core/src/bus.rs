//! The bounded event queue at the heart of the bus.
//!
//! Producers push `(origin, message)` pairs; the single dispatcher pops
//! them and delivers to consumers in order. `push` suspends while the queue
//! is full and `pop` while it is empty; explicit not-full / not-empty
//! signals wake the other side. The bus never overwrites queued events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use screenlink_types::Message;
use tokio::sync::Notify;

use crate::error::CoreError;
use crate::ring::RingBuffer;

/// Default bus capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One event on the bus: a message plus the identity that produced it.
#[derive(Debug, Clone)]
pub struct Event {
    /// Node name, peer id, or `"self"`; dispatch never delivers an event
    /// back to its origin.
    pub origin: String,
    pub message: Message,
}

impl Event {
    pub fn new(origin: impl Into<String>, message: Message) -> Self {
        Self {
            origin: origin.into(),
            message,
        }
    }
}

struct QueueInner {
    ring: Mutex<RingBuffer<Event>>,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
}

/// Clonable handle to the shared bounded queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                ring: Mutex::new(RingBuffer::new(capacity)),
                not_empty: Notify::new(),
                not_full: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Push without waiting; `false` iff the queue is full (or closed).
    pub fn try_push(&self, event: Event) -> bool {
        if self.inner.closed.load(Ordering::SeqCst) {
            return false;
        }
        let pushed = self
            .inner
            .ring
            .lock()
            .unwrap()
            .try_push(event)
            .is_ok();
        if pushed {
            self.inner.not_empty.notify_one();
        }
        pushed
    }

    /// Push, suspending until capacity is available.
    pub async fn push(&self, event: Event) -> Result<(), CoreError> {
        let mut event = event;
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(CoreError::QueueClosed);
            }
            match self.inner.ring.lock().unwrap().try_push(event) {
                Ok(()) => {
                    self.inner.not_empty.notify_one();
                    return Ok(());
                }
                Err(back) => event = back,
            }
            // notify_one stores a permit, so a pop between the failed push
            // and this await cannot be lost.
            self.inner.not_full.notified().await;
        }
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<Event> {
        let event = self.inner.ring.lock().unwrap().pop();
        if event.is_some() {
            self.inner.not_full.notify_one();
        }
        event
    }

    /// Pop, suspending until an event is available.
    pub async fn pop(&self) -> Result<Event, CoreError> {
        loop {
            if let Some(event) = self.try_pop() {
                return Ok(event);
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(CoreError::QueueClosed);
            }
            self.inner.not_empty.notified().await;
        }
    }

    /// Drop all queued events.
    pub fn clear(&self) {
        self.inner.ring.lock().unwrap().clear();
        self.inner.not_full.notify_waiters();
    }

    /// Refuse further pushes and wake all waiters. Queued events remain
    /// poppable via [`try_pop`](EventQueue::try_pop) so the dispatcher can
    /// drain.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.not_empty.notify_waiters();
        self.inner.not_full.notify_waiters();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.ring.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.ring.lock().unwrap().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.ring.lock().unwrap().capacity()
    }
}
