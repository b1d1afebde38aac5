//! Response buffer memory
//!
//! Buffers come from a [`TieredAllocator`]: an ordered list of (pool, size)
//! tiers tried front to back. The granted capacity may be smaller than the
//! preferred size, so callers bound every write by
//! [`ResponseBuffer::capacity`], never by what they asked for.

mod buffer;
mod cursor;
mod pool;

pub use buffer::ResponseBuffer;
pub use cursor::ByteCursor;
pub use pool::MemoryPool;

use crate::config::MemoryConfig;
use crate::{Error, Result};

/// One (pool, size) option in an allocator's fallback list
#[derive(Debug, Clone)]
pub struct Tier {
    pub pool: MemoryPool,
    pub size: usize,
}

/// A granted buffer and the tier that produced it
#[derive(Debug)]
pub struct Allocation {
    pub buffer: ResponseBuffer,
    /// Index into [`TieredAllocator::tiers`]
    pub tier: usize,
}

/// Ordered fallback policy for response buffers
#[derive(Debug, Clone, Default)]
pub struct TieredAllocator {
    tiers: Vec<Tier>,
}

impl TieredAllocator {
    #[must_use]
    pub const fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// Start with `size` tried in each of `pools`, in order
    #[must_use]
    pub fn preferred(size: usize, pools: impl IntoIterator<Item = MemoryPool>) -> Self {
        Self {
            tiers: pools.into_iter().map(|pool| Tier { pool, size }).collect(),
        }
    }

    /// Append a fallback tier
    #[must_use]
    pub fn then(mut self, pool: MemoryPool, size: usize) -> Self {
        self.tiers.push(Tier { pool, size });
        self
    }

    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Allocate from the first tier that can satisfy its size
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if every tier is exhausted
    pub fn allocate(&self) -> Result<Allocation> {
        let requested = self.tiers.first().map_or(0, |t| t.size);

        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.size == 0 {
                continue;
            }

            if let Some(buffer) = tier.pool.try_allocate(tier.size) {
                if index == 0 {
                    tracing::debug!(
                        pool = tier.pool.name(),
                        bytes = tier.size,
                        "allocated response buffer"
                    );
                } else {
                    tracing::info!(
                        pool = tier.pool.name(),
                        bytes = tier.size,
                        requested,
                        tier = index,
                        "using fallback response buffer"
                    );
                }
                return Ok(Allocation {
                    buffer,
                    tier: index,
                });
            }

            tracing::warn!(
                pool = tier.pool.name(),
                bytes = tier.size,
                available = ?tier.pool.available(),
                "allocation tier exhausted"
            );
        }

        tracing::error!(requested, "no allocation tier succeeded");
        Err(Error::OutOfMemory { requested })
    }
}

/// The named pools of the device
#[derive(Debug, Clone)]
pub struct MemoryPools {
    /// External RAM, preferred for large buffers
    pub psram: MemoryPool,
    /// Internal RAM, shared with the TLS stack
    pub internal: MemoryPool,
    /// General heap used for small fallback sizes
    pub heap: MemoryPool,
}

impl MemoryPools {
    /// Build pools from configured budgets; an unset budget means the system heap
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        let pool = |name: &str, budget: Option<usize>| {
            budget.map_or_else(
                || MemoryPool::system(name),
                |bytes| MemoryPool::budgeted(name, bytes),
            )
        };

        Self {
            psram: pool("psram", config.psram_budget),
            internal: pool("internal", config.internal_budget),
            heap: pool("heap", config.heap_budget),
        }
    }

    /// Preferred size in external then internal RAM, then the fixed fallbacks
    #[must_use]
    pub fn allocator(&self, preferred: usize, config: &MemoryConfig) -> TieredAllocator {
        TieredAllocator::preferred(preferred, [self.psram.clone(), self.internal.clone()])
            .then(self.heap.clone(), config.fallback_buffer)
            .then(self.heap.clone(), config.minimum_buffer)
    }
}
