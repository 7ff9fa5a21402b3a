//! # Per-Order Locks
//!
//! Every read-modify-write of an order aggregate runs under that order's
//! lock. Different orders never contend.
//!
//! ```text
//! webhook (ATK-2024-001) ──► lock("ATK-2024-001") ──► load → apply → save
//! cancel  (ATK-2024-001) ──► lock("ATK-2024-001") ──► waits
//! webhook (ATK-2024-002) ──► lock("ATK-2024-002") ──► runs concurrently
//! ```
//!
//! Entries nobody holds or waits on are dropped from the registry the next
//! time a lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard for one order. The lock is released when it is dropped.
pub type OrderGuard = OwnedMutexGuard<()>;

/// Registry of per-order mutexes.
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `order_id`.
    pub async fn acquire(&self, order_id: &str) -> OrderGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Waiters and holders keep a clone, so a count of 1 means idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(order_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of orders currently held or awaited.
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
