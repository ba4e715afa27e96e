//! Generic object pools for reducing allocation churn on hot paths.
//!
//! Generalizes the teacher's `orderbook::pool::MatchingPool` (which pooled
//! two concrete `Vec` shapes) into a single reusable pool of any `Vec<T>`,
//! used by the matching engine for scratch buffers (filled-order ids,
//! touched price levels) and by the distributor for event envelope
//! buffers. Per `spec.md` §5, callers must not retain a pooled vector past
//! the point they return it.
use std::cell::RefCell;

/// A thread-local pool of reusable, cleared `Vec<T>` buffers.
///
/// Not `Sync`: each matching thread (one per symbol, per the engine's
/// single-writer-per-symbol model) owns its own pool instance.
#[derive(Debug)]
pub struct VecPool<T> {
    slots: RefCell<Vec<Vec<T>>>,
    default_capacity: usize,
}

impl<T> VecPool<T> {
    /// Create an empty pool that allocates new buffers with the given
    /// default capacity when none are available for reuse.
    #[must_use]
    pub fn new(default_capacity: usize) -> Self {
        Self {
            slots: RefCell::new(Vec::with_capacity(4)),
            default_capacity,
        }
    }

    /// Take a cleared buffer from the pool, or allocate a new one.
    pub fn take(&self) -> Vec<T> {
        self.slots
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.default_capacity))
    }

    /// Return a buffer to the pool for reuse. The buffer is cleared but
    /// keeps its allocated capacity.
    pub fn give_back(&self, mut buf: Vec<T>) {
        buf.clear();
        self.slots.borrow_mut().push(buf);
    }

    /// Number of buffers currently held in reserve.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Returns `true` if the pool currently holds no spare buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for VecPool<T> {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_buffer_is_cleared() {
        let pool: VecPool<u32> = VecPool::new(8);
        let mut buf = pool.take();
        buf.extend_from_slice(&[1, 2, 3]);
        pool.give_back(buf);
        assert_eq!(pool.len(), 1);

        let reused = pool.take();
        assert!(reused.is_empty());
        assert_eq!(pool.len(), 0);
    }
}
