use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Order, Product, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{CartRow, Store, UnitOfWork},
};

/// Lock timeout used by [`InMemoryStore::new`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Committed state. Only ever written under the single write lock in
/// [`InMemoryUnitOfWork::commit`] so readers never see half a commit.
#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    carts: HashMap<UserId, Vec<CartRow>>,
}

/// Registry of row locks, one mutex per key.
#[derive(Debug)]
struct RowLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for RowLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone + std::fmt::Display> RowLocks<K> {
    async fn acquire(
        &self,
        key: &K,
        kind: &'static str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!("store_lock_timeouts_total", "kind" => kind).increment(1);
                tracing::warn!(%key, kind, ?timeout, "row lock timed out");
                Err(StoreError::LockTimeout {
                    resource: format!("{kind} {key}"),
                })
            }
        }
    }

    /// Releases `guard` and drops the entry for `key` if it went idle.
    async fn release(&self, key: K, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.prune([key]).await;
    }

    /// Drops the entries for `keys` that nobody holds or waits for.
    async fn prune(&self, keys: impl IntoIterator<Item = K>) {
        let mut locks = self.locks.lock().await;
        for key in keys {
            if locks
                .get(&key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&key);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Tables>,
    product_locks: RowLocks<ProductId>,
    cart_locks: RowLocks<UserId>,
    fail_on_commit: AtomicBool,
}

/// In-memory store implementation.
///
/// Behaves like the PostgreSQL store: each product and each user's cart is a
/// row guarded by its own lock, held by a unit of work until it commits or
/// rolls back. Used by tests and by the API binary when no database is
/// configured.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new empty store whose row locks give up after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_timeout,
        }
    }

    /// Returns the row lock timeout.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Removes a product from the catalog, as catalog management would.
    ///
    /// Cart rows referencing it go too, like the cascading foreign key does in
    /// PostgreSQL.
    pub async fn remove_product(&self, product_id: &ProductId) -> Result<()> {
        let row = self
            .inner
            .product_locks
            .acquire(product_id, "product", self.lock_timeout)
            .await?;
        let mut tables = self.inner.tables.write().await;
        tables.products.remove(product_id);
        for rows in tables.carts.values_mut() {
            rows.retain(|row| &row.product_id != product_id);
        }
        drop(tables);

        self.inner
            .product_locks
            .release(product_id.clone(), row)
            .await;
        Ok(())
    }

    /// Returns the committed available quantity of a product.
    pub async fn available_quantity(&self, product_id: &ProductId) -> Option<u32> {
        self.inner
            .tables
            .read()
            .await
            .products
            .get(product_id)
            .map(|p| p.available_quantity)
    }

    /// Configures every subsequent commit to fail (failure injection).
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.inner.fail_on_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        Ok(InMemoryUnitOfWork {
            inner: self.inner.clone(),
            lock_timeout: self.lock_timeout,
            product_guards: HashMap::new(),
            cart_guards: HashMap::new(),
            staged_products: HashMap::new(),
            dirty_products: HashSet::new(),
            staged_orders: Vec::new(),
            cleared_carts: Vec::new(),
        })
    }

    async fn find_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.products.get(product_id).cloned())
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        let row = self
            .inner
            .product_locks
            .acquire(&product.id, "product", self.lock_timeout)
            .await?;
        self.inner
            .tables
            .write()
            .await
            .products
            .insert(product.id.clone(), product.clone());

        self.inner
            .product_locks
            .release(product.id.clone(), row)
            .await;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn ping(&self) -> Result<()> {
        drop(self.inner.tables.read().await);
        Ok(())
    }

    async fn count_orders(&self) -> Result<u64> {
        let tables = self.inner.tables.read().await;
        Ok(tables.orders.len() as u64)
    }

    async fn cart_rows(&self, user_id: UserId) -> Result<Vec<CartRow>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn upsert_cart_row(&self, user_id: UserId, row: &CartRow) -> Result<()> {
        let cart = self
            .inner
            .cart_locks
            .acquire(&user_id, "cart", self.lock_timeout)
            .await?;
        let mut tables = self.inner.tables.write().await;
        let rows = tables.carts.entry(user_id).or_default();
        match rows.iter_mut().find(|r| r.product_id == row.product_id) {
            Some(existing) => existing.quantity = row.quantity,
            None => rows.push(row.clone()),
        }
        drop(tables);

        self.inner.cart_locks.release(user_id, cart).await;
        Ok(())
    }

    async fn delete_cart_row(&self, user_id: UserId, product_id: &ProductId) -> Result<()> {
        let cart = self
            .inner
            .cart_locks
            .acquire(&user_id, "cart", self.lock_timeout)
            .await?;
        let mut tables = self.inner.tables.write().await;
        if let Some(rows) = tables.carts.get_mut(&user_id) {
            rows.retain(|r| &r.product_id != product_id);
        }
        drop(tables);

        self.inner.cart_locks.release(user_id, cart).await;
        Ok(())
    }

    async fn clear_cart_rows(&self, user_id: UserId) -> Result<()> {
        let cart = self
            .inner
            .cart_locks
            .acquire(&user_id, "cart", self.lock_timeout)
            .await?;
        self.inner.tables.write().await.carts.remove(&user_id);

        self.inner.cart_locks.release(user_id, cart).await;
        Ok(())
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Changes are staged locally and applied in one step on commit. Dropping the
/// unit of work releases its locks and discards the staged changes.
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    inner: Arc<Inner>,
    lock_timeout: Duration,
    product_guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    cart_guards: HashMap<UserId, OwnedMutexGuard<()>>,
    staged_products: HashMap<ProductId, Product>,
    dirty_products: HashSet<ProductId>,
    staged_orders: Vec<Order>,
    cleared_carts: Vec<UserId>,
}

impl InMemoryUnitOfWork {
    async fn ensure_cart_lock(&mut self, user_id: UserId) -> Result<()> {
        if !self.cart_guards.contains_key(&user_id) {
            let guard = self
                .inner
                .cart_locks
                .acquire(&user_id, "cart", self.lock_timeout)
                .await?;
            self.cart_guards.insert(user_id, guard);
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Vec<CartRow>> {
        self.ensure_cart_lock(user_id).await?;
        let tables = self.inner.tables.read().await;
        Ok(tables.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        if let Some(product) = self.staged_products.get(product_id) {
            return Ok(Some(product.clone()));
        }

        if !self.product_guards.contains_key(product_id) {
            let guard = self
                .inner
                .product_locks
                .acquire(product_id, "product", self.lock_timeout)
                .await?;
            self.product_guards.insert(product_id.clone(), guard);
        }

        // Holding the row lock, the committed value cannot change under us.
        let product = self
            .inner
            .tables
            .read()
            .await
            .products
            .get(product_id)
            .cloned();
        if let Some(product) = &product {
            self.staged_products
                .insert(product_id.clone(), product.clone());
        }
        Ok(product)
    }

    async fn decrement_stock(&mut self, product_id: &ProductId, amount: u32) -> Result<()> {
        if !self.staged_products.contains_key(product_id) {
            self.lock_product(product_id).await?;
        }

        let product = self
            .staged_products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        let available = product.available_quantity;
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| StoreError::StockUnderflow {
                product_id: product_id.clone(),
                available,
                requested: amount,
            })?;
        product.available_quantity = remaining;
        self.dirty_products.insert(product_id.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged_orders.push(order.clone());
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        self.ensure_cart_lock(user_id).await?;
        self.cleared_carts.push(user_id);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryUnitOfWork {
            inner,
            product_guards,
            cart_guards,
            staged_products,
            dirty_products,
            staged_orders,
            cleared_carts,
            ..
        } = self;

        if inner.fail_on_commit.load(Ordering::SeqCst) {
            tracing::warn!("commit refused by failure injection, rolling back");
            release_locks(&inner, product_guards, cart_guards).await;
            return Err(StoreError::CommitFailed("injected failure".to_string()));
        }

        let mut tables = inner.tables.write().await;
        for product_id in dirty_products {
            if let Some(product) = staged_products.get(&product_id) {
                tables.products.insert(product_id, product.clone());
            }
        }
        for order in staged_orders {
            tables.orders.insert(order.id(), order);
        }
        for user_id in cleared_carts {
            tables.carts.remove(&user_id);
        }
        drop(tables);

        // Row locks are released only now, after the new values are visible.
        release_locks(&inner, product_guards, cart_guards).await;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!(
            locked_products = self.product_guards.len(),
            "rolling back unit of work"
        );
        let InMemoryUnitOfWork {
            inner,
            product_guards,
            cart_guards,
            ..
        } = self;
        release_locks(&inner, product_guards, cart_guards).await;
        Ok(())
    }
}

/// Releases the guards, then drops registry entries no other unit of work
/// is holding or waiting on.
async fn release_locks(
    inner: &Inner,
    product_guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    cart_guards: HashMap<UserId, OwnedMutexGuard<()>>,
) {
    let products: Vec<ProductId> = product_guards.into_keys().collect();
    let users: Vec<UserId> = cart_guards.into_keys().collect();
    inner.product_locks.prune(products).await;
    inner.cart_locks.prune(users).await;
}
