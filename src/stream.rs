/*! Streams connecting blocks.

Blocks are connected with streams. In this crate the only thing flowing
between blocks is whole objects (frames), so every stream is a "no copy"
stream: a queue handing off ownership of one item at a time.
*/
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    closed: AtomicBool,
}

impl<T> Inner<T> {
    // A panicking writer can't leave a VecDeque half-pushed, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a new no-copy stream, returning the write and read ends.
#[must_use]
pub fn new_nocopy_stream<T>() -> (NCWriteStream<T>, NCReadStream<T>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::new()),
        closed: AtomicBool::new(false),
    });
    (
        NCWriteStream {
            inner: inner.clone(),
        },
        NCReadStream { inner },
    )
}

/// Write end of a no-copy stream.
///
/// Dropping the writer closes the stream. The reader can still drain what
/// was pushed before that.
#[derive(Debug)]
pub struct NCWriteStream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> NCWriteStream<T> {
    /// Push one item, handing off ownership.
    pub fn push(&self, val: T) {
        self.inner.lock().push_back(val);
    }

    /// Number of items not yet consumed by the reader.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if the reader has consumed everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for NCWriteStream<T> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

/// Read end of a no-copy stream.
#[derive(Debug)]
pub struct NCReadStream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> NCReadStream<T> {
    /// Pop one item.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// True if there is nothing to pop right now.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// True if the writer is gone. There may still be items to pop.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// True if the writer is gone and everything has been popped.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.closed() && self.is_empty()
    }
}
