use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Failure modes of a non-blocking push; both hand the element back.
#[derive(Debug)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A fixed-capacity FIFO shared between two pipeline stages.
///
/// Pushes never block: a full queue refuses the element so the producer
/// can apply its backpressure policy. Pops may block on a condition
/// variable. Closing is irreversible and wakes every blocked popper.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends an element, or returns it if the queue is full or closed.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed(item));
        }
        if inner.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        inner.items.push_back(item);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an element is available or the queue is closed.
    pub fn pop_wait(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Returns the front element if one is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Appends an element even after close. Pools use this so elements
    /// released during teardown still reach the free list and the
    /// population count stays exact. A full queue still refuses.
    pub fn readmit(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        inner.items.push_back(item);
        self.available.notify_one();
        Ok(())
    }

    /// Closes the queue and wakes every blocked popper. Irreversible.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.available.notify_all();
    }

    /// Removes and returns whatever is still queued, closed or not.
    /// Used at connection teardown to route elements back to their pools.
    pub fn drain_remaining(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.items).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Resets a pooled element to its initial state before reuse.
pub trait Recycle {
    fn recycle(&mut self);
}

/// A fixed population of recycled elements.
///
/// The pool is a bounded queue pre-filled at construction; every element
/// that leaves it has a defined return path, so a blocking acquire can
/// only fail once the pool has been closed.
pub struct Pool<T: Recycle> {
    queue: BoundedQueue<Box<T>>,
}

impl<T: Recycle + Default> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        let queue = BoundedQueue::new(capacity);
        for _ in 0..capacity {
            let _ = queue.push(Box::new(T::default()));
        }
        Self { queue }
    }
}

impl<T: Recycle> Pool<T> {
    /// Blocks until an element is free or the pool is closed.
    pub fn acquire_wait(&self) -> Option<Box<T>> {
        self.queue.pop_wait()
    }

    /// Takes a free element if one is immediately available.
    pub fn try_acquire(&self) -> Option<Box<T>> {
        self.queue.try_pop()
    }

    /// Resets an element and returns it to the free list. Works during
    /// teardown too, so the pool population stays exact.
    pub fn release(&self, mut elem: Box<T>) {
        elem.recycle();
        // Full cannot happen: a pool never holds more elements than its
        // capacity.
        let _ = self.queue.readmit(elem);
    }

    pub fn close(&self) {
        self.queue.close();
    }

    /// Number of elements currently on the free list.
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
