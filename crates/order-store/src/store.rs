use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Order, Product, ProductId};

use crate::Result;

/// One persisted cart line: (owning user, product, quantity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRow {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartRow {
    /// Creates a cart row.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Core trait for store implementations.
///
/// Reads here never take locks and may observe slightly stale values; the
/// authoritative reads happen inside a [`UnitOfWork`]. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by [`Store::begin`].
    type Tx: UnitOfWork;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Catalog lookup without locking.
    async fn find_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Creates or replaces a catalog product, including its stock level.
    ///
    /// Stands in for catalog management, which sets stock directly.
    async fn put_product(&self, product: &Product) -> Result<()>;

    /// Loads a placed order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the number of placed orders.
    async fn count_orders(&self) -> Result<u64>;

    /// Cheap round trip confirming the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Returns a user's cart rows in insertion order.
    async fn cart_rows(&self, user_id: UserId) -> Result<Vec<CartRow>>;

    /// Inserts a cart row or overwrites its quantity.
    async fn upsert_cart_row(&self, user_id: UserId, row: &CartRow) -> Result<()>;

    /// Deletes a cart row; no-op if absent.
    async fn delete_cart_row(&self, user_id: UserId, product_id: &ProductId) -> Result<()>;

    /// Deletes every cart row of a user.
    async fn clear_cart_rows(&self, user_id: UserId) -> Result<()>;
}

/// A single atomic unit of work.
///
/// Locks taken through this trait are held until the unit of work is
/// committed or rolled back. Dropping it without committing rolls back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks a user's cart rows and returns them.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Vec<CartRow>>;

    /// Find-with-lock: locks the product row and returns its current state.
    ///
    /// Returns `None` if the product no longer exists.
    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Decrements the available quantity of a product.
    ///
    /// Locks the row first if this unit of work does not hold it yet. Never
    /// takes the ledger below zero.
    async fn decrement_stock(&mut self, product_id: &ProductId, amount: u32) -> Result<()>;

    /// Inserts a new order and its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Deletes every cart row of a user as part of this unit of work.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<()>;

    /// Makes every change durable and releases all locks.
    async fn commit(self) -> Result<()>;

    /// Discards every change and releases all locks.
    async fn rollback(self) -> Result<()>;
}
