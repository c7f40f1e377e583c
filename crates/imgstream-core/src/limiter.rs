//! Bounded admission for concurrent operations
//!
//! Each operation class (transfers, listings) gets its own limiter with a
//! fixed capacity. Callers hold a [`Slot`] for the duration of one operation;
//! dropping the slot returns it, so every exit path releases, including
//! errors and deadline expiry.
//!
//! Waiters are admitted in FIFO order, so a steady stream of new callers
//! cannot starve an earlier waiter. A slot that is leaked (for example with
//! `mem::forget`) permanently reduces capacity; nothing reclaims it.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Default capacity for transfer operations
pub const DEFAULT_TRANSFER_CAPACITY: usize = 10;

/// Default capacity for listing operations
pub const DEFAULT_LISTING_CAPACITY: usize = 100;

/// Class of operation a limiter governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Uploads and downloads
    Transfer,
    /// Listings
    Listing,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Transfer => f.write_str("transfer"),
            OperationClass::Listing => f.write_str("listing"),
        }
    }
}

/// Limiter metrics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LimiterMetrics {
    /// Total slots handed out
    pub admitted: u64,

    /// Slots currently held
    pub in_flight: usize,

    /// Highest number of slots held at once
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counting admission gate with a fixed capacity
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    class: OperationClass,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `capacity` holders (minimum 1)
    pub fn new(class: OperationClass, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            class,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Limiter for transfer operations
    pub fn transfers(capacity: usize) -> Self {
        Self::new(OperationClass::Transfer, capacity)
    }

    /// Limiter for listing operations
    pub fn listings(capacity: usize) -> Self {
        Self::new(OperationClass::Listing, capacity)
    }

    /// Wait until a slot is free, then take it
    pub async fn acquire(&self) -> Result<Slot> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::internal("concurrency limiter closed"))?;

        Ok(self.admit(permit))
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Slot> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(self.admit(permit)),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }

    /// Operation class
    pub fn class(&self) -> OperationClass {
        self.class
    }

    /// Maximum concurrent holders
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of the limiter metrics
    pub fn metrics(&self) -> LimiterMetrics {
        LimiterMetrics {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Acquire),
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> Slot {
        let held = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters
            .peak_in_flight
            .fetch_max(held, Ordering::AcqRel);
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);

        tracing::trace!("{} slot acquired ({}/{})", self.class, held, self.capacity);
        Slot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }
}

/// One unit of admission, released on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as it is dropped"]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Slot {
    /// Return the slot explicitly
    pub fn release(self) {}
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let limiter = ConcurrencyLimiter::transfers(2);
        assert_eq!(limiter.capacity(), 2);
        assert_eq!(limiter.available(), 2);

        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.in_flight(), 2);
        assert!(limiter.try_acquire().is_none());

        a.release();
        assert_eq!(limiter.available(), 1);
        drop(b);
        assert_eq!(limiter.available(), 2);
        assert_eq!(limiter.in_flight(), 0);

        let metrics = limiter.metrics();
        assert_eq!(metrics.admitted, 2);
        assert_eq!(metrics.peak_in_flight, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        let limiter = ConcurrencyLimiter::listings(0);
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.class(), OperationClass::Listing);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_waiter_admitted_after_release() {
        let limiter = ConcurrencyLimiter::transfers(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _slot = limiter.acquire().await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted")
            .unwrap();
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        const CAPACITY: usize = 3;
        const CALLERS: usize = 12;

        let limiter = ConcurrencyLimiter::transfers(CAPACITY);
        let mut tasks = Vec::new();

        for _ in 0..CALLERS {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                let _slot = limiter.acquire().await.unwrap();
                assert!(limiter.in_flight() <= CAPACITY);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        let metrics = limiter.metrics();
        assert_eq!(metrics.admitted, CALLERS as u64);
        assert_eq!(metrics.in_flight, 0);
        assert!(metrics.peak_in_flight <= CAPACITY);
        assert_eq!(limiter.available(), CAPACITY);
    }

    #[tokio::test]
    async fn test_slot_released_on_error_path() {
        async fn failing_operation(limiter: &ConcurrencyLimiter) -> Result<()> {
            let _slot = limiter.acquire().await?;
            Err(Error::internal("boom"))
        }

        let limiter = ConcurrencyLimiter::transfers(1);
        assert!(failing_operation(&limiter).await.is_err());
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_class_display() {
        assert_eq!(OperationClass::Transfer.to_string(), "transfer");
        assert_eq!(OperationClass::Listing.to_string(), "listing");
    }
}
