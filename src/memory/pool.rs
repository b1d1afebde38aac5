//! Memory pools backing response buffers

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ResponseBuffer;

/// A source of response buffer memory
///
/// A pool is either the unbounded system heap or a fixed byte budget (the
/// external PSRAM or internal RAM region on the device). Cloning a pool shares
/// its budget.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    name: Arc<str>,
    budget: Option<Arc<AtomicUsize>>,
}

impl MemoryPool {
    /// Pool drawing from the system heap with no budget of its own
    #[must_use]
    pub fn system(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            budget: None,
        }
    }

    /// Pool limited to `bytes` outstanding bytes
    #[must_use]
    pub fn budgeted(name: &str, bytes: usize) -> Self {
        Self {
            name: Arc::from(name),
            budget: Some(Arc::new(AtomicUsize::new(bytes))),
        }
    }

    /// Pool name, used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes still available, or `None` for the unbounded system heap
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.budget.as_ref().map(|b| b.load(Ordering::Acquire))
    }

    /// Try to carve a buffer of exactly `size` bytes out of this pool
    ///
    /// Returns `None` when the budget is exhausted or the heap refuses the
    /// reservation. Never panics on allocation failure.
    pub(crate) fn try_allocate(&self, size: usize) -> Option<ResponseBuffer> {
        let lease = match &self.budget {
            Some(budget) => {
                budget
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| {
                        free.checked_sub(size)
                    })
                    .ok()?;
                Some(Lease {
                    budget: Arc::clone(budget),
                    size,
                })
            }
            None => None,
        };

        let mut data = Vec::new();
        if data.try_reserve_exact(size).is_err() {
            // the lease refunds the budget on drop
            return None;
        }

        Some(ResponseBuffer::from_parts(
            data,
            size,
            Arc::clone(&self.name),
            lease,
        ))
    }
}

/// Budget held by a live buffer, refunded on drop
#[derive(Debug)]
pub(crate) struct Lease {
    budget: Arc<AtomicUsize>,
    size: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.budget.fetch_add(self.size, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_consumed_and_refunded() {
        let pool = MemoryPool::budgeted("psram", 1024);

        let buf = pool.try_allocate(1000).unwrap();
        assert_eq!(buf.capacity(), 1000);
        assert_eq!(pool.available(), Some(24));

        assert!(pool.try_allocate(100).is_none());
        assert_eq!(pool.available(), Some(24));

        drop(buf);
        assert_eq!(pool.available(), Some(1024));
    }

    #[test]
    fn clones_share_budget() {
        let pool = MemoryPool::budgeted("internal", 64);
        let other = pool.clone();

        let _held = pool.try_allocate(48).unwrap();
        assert!(other.try_allocate(32).is_none());
        assert!(other.try_allocate(16).is_some());
    }

    #[test]
    fn system_pool_is_unbounded() {
        let pool = MemoryPool::system("heap");
        assert_eq!(pool.available(), None);
        assert_eq!(pool.try_allocate(4096).unwrap().capacity(), 4096);
    }
}
