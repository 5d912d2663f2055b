//! Quantity-based locks
//!
//! Each label names a finite pool of slots. A stage holds `quantity` slots
//! of one pool for as long as its [`LockGuard`] lives; dropping the guard
//! (on success, failure or unwinding) returns the slots.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// A claim on `quantity` slots of the pool named `label`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub label: String,
    pub quantity: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Unknown lock: {0}")]
    UnknownLabel(String),

    #[error("Lock {label} has {capacity} slots, {requested} requested")]
    ExceedsCapacity {
        label: String,
        requested: u32,
        capacity: u32,
    },

    #[error("Lock {0} requested with zero quantity")]
    ZeroQuantity(String),

    #[error("Lock {0} is closed")]
    Closed(String),
}

#[derive(Debug)]
struct Pool {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

/// All lock pools of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct LockPool {
    pools: Arc<HashMap<String, Pool>>,
}

impl LockPool {
    pub fn new(sizes: &HashMap<String, u32>) -> Self {
        let pools = sizes
            .iter()
            .map(|(label, capacity)| {
                (
                    label.clone(),
                    Pool {
                        semaphore: Arc::new(Semaphore::new(*capacity as usize)),
                        capacity: *capacity,
                    },
                )
            })
            .collect();
        Self {
            pools: Arc::new(pools),
        }
    }

    pub fn capacity(&self, label: &str) -> Option<u32> {
        self.pools.get(label).map(|p| p.capacity)
    }

    /// Slots of `label` not currently held
    pub fn available(&self, label: &str) -> Option<usize> {
        self.pools.get(label).map(|p| p.semaphore.available_permits())
    }

    /// Wait until `request.quantity` slots are free and take them
    pub async fn acquire(&self, request: &LockRequest) -> Result<LockGuard, LockError> {
        let pool = self
            .pools
            .get(&request.label)
            .ok_or_else(|| LockError::UnknownLabel(request.label.clone()))?;

        if request.quantity == 0 {
            return Err(LockError::ZeroQuantity(request.label.clone()));
        }
        if request.quantity > pool.capacity {
            return Err(LockError::ExceedsCapacity {
                label: request.label.clone(),
                requested: request.quantity,
                capacity: pool.capacity,
            });
        }

        debug!(
            "Waiting for {} slot(s) of {} ({} free)",
            request.quantity,
            request.label,
            pool.semaphore.available_permits()
        );
        let permit = pool
            .semaphore
            .clone()
            .acquire_many_owned(request.quantity)
            .await
            .map_err(|_| LockError::Closed(request.label.clone()))?;
        info!("Acquired {} slot(s) of {}", request.quantity, request.label);

        Ok(LockGuard {
            label: request.label.clone(),
            quantity: request.quantity,
            _permit: permit,
        })
    }
}

/// Held slots; released on drop
#[derive(Debug)]
pub struct LockGuard {
    label: String,
    quantity: u32,
    _permit: OwnedSemaphorePermit,
}

impl LockGuard {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        info!("Released {} slot(s) of {}", self.quantity, self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn pool(label: &str, size: u32) -> LockPool {
        LockPool::new(&HashMap::from([(label.to_string(), size)]))
    }

    fn request(label: &str, quantity: u32) -> LockRequest {
        LockRequest {
            label: label.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_n_single_slot_requests_fit_pool_of_n() {
        let locks = pool("gpu", 3);
        let a = locks.acquire(&request("gpu", 1)).await.unwrap();
        let b = locks.acquire(&request("gpu", 1)).await.unwrap();
        let c = locks.acquire(&request("gpu", 1)).await.unwrap();

        assert_eq!(locks.available("gpu"), Some(0));
        assert_eq!(locks.capacity("gpu"), Some(3));
        drop((a, b, c));
        assert_eq!(locks.available("gpu"), Some(3));
    }

    #[tokio::test]
    async fn test_request_blocks_until_enough_released() {
        let locks = pool("gpu", 4);
        let held = locks.acquire(&request("gpu", 3)).await.unwrap();
        let small = locks.acquire(&request("gpu", 1)).await.unwrap();

        let waiter = locks.clone();
        let mut pending = task::spawn(async move { waiter.acquire(&request("gpu", 2)).await });
        assert_pending!(pending.poll());

        drop(small);
        assert_pending!(pending.poll());

        drop(held);
        assert!(pending.is_woken());
        let guard = assert_ready!(pending.poll()).unwrap();
        assert_eq!(guard.quantity(), 2);
        assert_eq!(locks.available("gpu"), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_label() {
        let locks = pool("gpu", 1);
        let err = locks.acquire(&request("cpu", 1)).await.unwrap_err();
        assert!(matches!(err, LockError::UnknownLabel(label) if label == "cpu"));
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected() {
        let locks = pool("gpu", 2);
        let err = locks.acquire(&request("gpu", 3)).await.unwrap_err();
        assert!(matches!(err, LockError::ExceedsCapacity { requested: 3, capacity: 2, .. }));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let locks = pool("gpu", 2);
        assert!(matches!(
            locks.acquire(&request("gpu", 0)).await,
            Err(LockError::ZeroQuantity(_))
        ));
    }

    #[tokio::test]
    async fn test_labels_are_independent() {
        let locks = LockPool::new(&HashMap::from([
            ("a".to_string(), 1),
            ("b".to_string(), 1),
        ]));
        let _a = locks.acquire(&request("a", 1)).await.unwrap();
        let b = locks.acquire(&request("b", 1)).await.unwrap();
        assert_eq!(b.label(), "b");
        assert_eq!(locks.available("a"), Some(0));
    }
}
