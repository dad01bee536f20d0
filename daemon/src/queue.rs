//! Bounded FIFO hand-off between the acquirer and the player
//!
//! The queue carries [`MediaHandle`]s only, never decoded frames, so its
//! capacity bounds the disk space taken by downloaded videos waiting to play.
//! It is a tokio bounded channel split into a producer half, used from the
//! async acquirer task, and a consumer half, used from the player thread.
//!
//! `len()` on either half is a snapshot for soft indicators. It can be stale
//! by the time it is read and must not be used to reason about correctness.

use common::MediaHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// A rejected offer. The handle is returned to the caller untouched.
#[derive(Error, Debug)]
pub enum OfferError {
    #[error("queue is full")]
    Full(MediaHandle),

    #[error("queue consumer has gone away")]
    Closed(MediaHandle),
}

impl OfferError {
    /// Recover the handle that could not be queued
    pub fn into_handle(self) -> MediaHandle {
        match self {
            Self::Full(handle) | Self::Closed(handle) => handle,
        }
    }
}

/// Create a queue holding at most `capacity` handles
pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueProducer { tx }, QueueConsumer { rx, capacity })
}

/// Insert side of the queue
#[derive(Debug)]
pub struct QueueProducer {
    tx: mpsc::Sender<MediaHandle>,
}

impl QueueProducer {
    /// Append a handle without waiting
    pub fn offer(&self, handle: MediaHandle) -> Result<(), OfferError> {
        self.tx.try_send(handle).map_err(|e| match e {
            mpsc::error::TrySendError::Full(handle) => OfferError::Full(handle),
            mpsc::error::TrySendError::Closed(handle) => OfferError::Closed(handle),
        })
    }

    /// Approximate number of queued handles
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an offer would currently be rejected as full
    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the consumer half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Remove side of the queue
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<MediaHandle>,
    capacity: usize,
}

impl QueueConsumer {
    /// Remove the oldest handle, blocking the calling thread while the queue
    /// is empty. Returns `None` once the producer is gone and nothing is left.
    ///
    /// Must not be called from inside an async context.
    pub fn take(&mut self) -> Option<MediaHandle> {
        self.rx.blocking_recv()
    }

    /// Approximate number of queued handles
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until at least `count` handles are queued, checking every
    /// `poll`. Returns false if the producer went away first.
    pub fn wait_for(&self, count: usize, poll: Duration) -> bool {
        let count = count.min(self.capacity);
        loop {
            if self.rx.len() >= count {
                return true;
            }
            if self.rx.is_closed() {
                return self.rx.len() >= count;
            }
            std::thread::sleep(poll);
        }
    }
}
