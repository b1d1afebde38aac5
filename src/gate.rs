//! Single-flight gate serializing secure connections
//!
//! The TLS stack on the device can only afford one session at a time, so every
//! request acquires the gate before connecting and holds the [`GateToken`]
//! until the response is fully consumed. The token releases on drop, which
//! covers every early return.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

#[derive(Debug)]
struct GateInner {
    semaphore: Arc<Semaphore>,
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

/// Mutual-exclusion gate; clones share the same gate
#[derive(Debug, Clone)]
pub struct NetworkGate {
    inner: Arc<GateInner>,
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(1)),
                acquisitions: AtomicU64::new(0),
                releases: AtomicU64::new(0),
            }),
        }
    }

    /// Wait until the gate is free, then hold it
    ///
    /// # Errors
    ///
    /// Returns [`Error::GateTimeout`] if the gate is still held when `timeout` elapses
    pub async fn acquire(&self, timeout: Duration) -> Result<GateToken> {
        let semaphore = Arc::clone(&self.inner.semaphore);
        let started = Instant::now();

        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                tracing::debug!(waited_ms = started.elapsed().as_millis(), "network gate acquired");
                Ok(self.token(permit))
            }
            Ok(Err(_)) => Err(Error::Transport("network gate closed".to_string())),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis(), "failed to acquire network gate");
                Err(Error::GateTimeout(timeout))
            }
        }
    }

    /// Hold the gate only if it is free right now
    #[must_use]
    pub fn try_acquire(&self) -> Option<GateToken> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;
        Some(self.token(permit))
    }

    fn token(&self, permit: OwnedSemaphorePermit) -> GateToken {
        self.inner.acquisitions.fetch_add(1, Ordering::AcqRel);
        GateToken {
            permit: Some(permit),
            gate: Arc::clone(&self.inner),
            acquired_at: Instant::now(),
        }
    }

    /// Whether a token is currently outstanding
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.semaphore.available_permits() == 0
    }

    /// Total successful acquisitions
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::Acquire)
    }

    /// Total releases
    #[must_use]
    pub fn releases(&self) -> u64 {
        self.inner.releases.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`NetworkGate`]
#[derive(Debug)]
pub struct GateToken {
    permit: Option<OwnedSemaphorePermit>,
    gate: Arc<GateInner>,
    acquired_at: Instant,
}

impl GateToken {
    /// Release the gate
    ///
    /// Returns `false` (and logs) if this token was already released.
    pub fn release(&mut self) -> bool {
        let Some(permit) = self.permit.take() else {
            tracing::warn!("network gate released twice");
            return false;
        };

        self.gate.releases.fetch_add(1, Ordering::AcqRel);
        drop(permit);
        tracing::debug!(
            held_ms = self.acquired_at.elapsed().as_millis(),
            "network gate released"
        );
        true
    }

    /// Whether this token still holds the gate
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

impl Drop for GateToken {
    fn drop(&mut self) {
        if self.permit.is_some() {
            self.release();
        }
    }
}
