//! Per-cart lock registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::CartOwner;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{CheckoutError, Result};

/// Held while a cart is being mutated or checked out.
pub type CartGuard = OwnedMutexGuard<()>;

/// One mutex per cart, created on first use.
///
/// Mutations and checkouts of the same cart are strictly serialized; different
/// carts never wait on each other here.
#[derive(Debug, Clone)]
pub struct CartLocks {
    locks: Arc<Mutex<HashMap<CartOwner, Arc<Mutex<()>>>>>,
    timeout: Duration,
}

impl CartLocks {
    /// Creates an empty registry whose locks give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Acquires the lock of `owner`'s cart.
    ///
    /// Fails with [`CheckoutError::LockTimeout`] if another writer holds it
    /// for longer than the configured timeout.
    pub async fn acquire(&self, owner: CartOwner) -> Result<CartGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(owner).or_default().clone()
        };

        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%owner, timeout = ?self.timeout, "cart lock timed out");
                CheckoutError::LockTimeout {
                    resource: format!("cart {owner}"),
                }
            })
    }

    /// Drops registry entries nobody holds or waits for. Returns how many went.
    pub async fn release_idle(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Returns the number of carts with a registry entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Returns true if no cart has a registry entry.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
