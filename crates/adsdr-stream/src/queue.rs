//! Bounded single-producer single-consumer (SPSC) sample queue.
//!
//! One queue exists per stream direction. For RX the I/O worker produces
//! and the application consumes; for TX the roles are swapped. The queue
//! is split into a [`Producer`] and a [`Consumer`] half at construction,
//! and each half needs `&mut self` to operate, so there is exactly one
//! producer and one consumer per queue.
//!
//! Neither side ever blocks: a push into a full queue hands the value
//! back, and a pop from an empty queue returns `None`. Storage is a
//! lock-free `crossbeam_channel` array channel.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Create a queue holding up to `capacity` values.
///
/// # Panics
///
/// Panics if `capacity` is zero. `StreamConfig::validate` rejects that
/// before any queue is built.
pub fn sample_queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "sample queue capacity must be non-zero");
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (Producer { tx, capacity }, Consumer { rx, capacity })
}

/// The writing half of a sample queue.
pub struct Producer<T> {
    tx: Sender<T>,
    capacity: usize,
}

impl<T> Producer<T> {
    /// Append a value, handing it back if the queue is full.
    ///
    /// A value pushed after the consumer is gone is handed back too.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        self.tx.try_send(value).map_err(|e| match e {
            TrySendError::Full(v) | TrySendError::Disconnected(v) => v,
        })
    }

    /// Values currently queued.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The reading half of a sample queue.
pub struct Consumer<T> {
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> Consumer<T> {
    /// Take the oldest value, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Values currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
