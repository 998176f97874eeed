//! Mailbox: per-actor bounded inbound queue
//!
//! FIFO overall, which gives FIFO per sender. When the queue is full an
//! incoming droppable control signal evicts the oldest queued droppable
//! signal; everything else is refused with [`EnqueueError::Full`] so the
//! sender backs off. Artifact payloads are never dropped by the mailbox.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::{ActorId, Envelope};

/// Why an enqueue was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    /// At capacity with nothing evictable; retry later
    Full,
    /// The owning actor is gone
    Closed,
}

struct MailboxInner {
    queue: VecDeque<Envelope>,
    closed: bool,
    evicted: u64,
}

/// Bounded inbound queue owned by one actor
pub struct Mailbox {
    owner: ActorId,
    capacity: usize,
    inner: Mutex<MailboxInner>,
    notify: Notify,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Mailbox {
    pub fn new(owner: ActorId, capacity: usize) -> Self {
        debug!(%owner, capacity, "Mailbox::new: called");
        Self {
            owner,
            capacity: capacity.max(1),
            inner: Mutex::new(MailboxInner {
                queue: VecDeque::new(),
                closed: false,
                evicted: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a message without waiting for room
    pub async fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(EnqueueError::Closed);
        }

        if inner.queue.len() >= self.capacity {
            if !envelope.is_droppable() {
                debug!(owner = %self.owner, sender = %envelope.sender, seq = envelope.sequence, "Mailbox::enqueue: full");
                return Err(EnqueueError::Full);
            }
            match inner.queue.iter().position(|e| e.is_droppable()) {
                Some(index) => {
                    inner.queue.remove(index);
                    inner.evicted += 1;
                    debug!(owner = %self.owner, "Mailbox::enqueue: evicted oldest droppable signal");
                }
                None => return Err(EnqueueError::Full),
            }
        }

        inner.queue.push_back(envelope);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the mailbox is closed and empty. Cancel-safe: a
    /// message is only removed in the same poll that returns it.
    pub async fn dequeue(&self) -> Option<Envelope> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(envelope) = inner.queue.pop_front() {
                    return Some(envelope);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Take the next message if one is queued
    pub async fn try_dequeue(&self) -> Option<Envelope> {
        self.inner.lock().await.queue.pop_front()
    }

    /// Refuse further messages and discard what is queued
    ///
    /// Returns the discarded messages so the caller can account for them.
    pub async fn close(&self) -> Vec<Envelope> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let discarded: Vec<Envelope> = inner.queue.drain(..).collect();
        drop(inner);
        self.notify.notify_one();
        debug!(owner = %self.owner, discarded = discarded.len(), "Mailbox::close: called");
        discarded
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.queue.is_empty()
    }

    /// Number of droppable signals evicted so far
    pub async fn evicted(&self) -> u64 {
        self.inner.lock().await.evicted
    }
}
