//! Cart mutations as exposed to callers.

use domain::cart::{cart_total, positive_quantity};
use domain::{CartLine, CartOwner, Money, Product, ProductId};
use order_store::Store;
use serde::Serialize;

use crate::cart::{SessionCarts, open_cart};
use crate::error::{CheckoutError, Result};
use crate::locks::CartLocks;

/// Read model of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total_amount: Money,
    pub total_quantity: u64,
}

impl CartView {
    fn from_lines(lines: Vec<CartLine>) -> Result<Self> {
        let total_amount = cart_total(&lines)?;
        let total_quantity = lines.iter().map(|line| u64::from(line.quantity)).sum();
        Ok(Self {
            lines,
            total_amount,
            total_quantity,
        })
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Looks up products, takes the cart lock and applies the mutation to the
/// owner's cart, whichever form it has.
pub struct CartService<S> {
    store: S,
    sessions: SessionCarts,
    locks: CartLocks,
}

impl<S: Store> CartService<S> {
    /// Creates a cart service sharing `sessions` and `locks` with checkout.
    pub fn new(store: S, sessions: SessionCarts, locks: CartLocks) -> Self {
        Self {
            store,
            sessions,
            locks,
        }
    }

    /// Returns the owner's cart.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn view(&self, owner: CartOwner) -> Result<CartView> {
        let cart = open_cart(&self.store, &self.sessions, owner);
        Ok(CartView::from_lines(cart.lines().await?)?)
    }

    /// Adds `quantity` units of a product to the owner's cart.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn add_item(
        &self,
        owner: CartOwner,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        let product = self.product(product_id).await?;
        let _guard = self.locks.acquire(owner).await?;

        let mut cart = open_cart(&self.store, &self.sessions, owner);
        cart.add_item(&product, quantity).await?;
        record_mutation("add");

        Ok(CartView::from_lines(cart.lines().await?)?)
    }

    /// Sets the quantity of a line; zero or less removes it.
    ///
    /// Removal needs no catalog lookup, so it also works for products that
    /// have since left the catalog.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn update_quantity(
        &self,
        owner: CartOwner,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<CartView> {
        let product = match positive_quantity(quantity) {
            Some(_) => Some(self.product(product_id).await?),
            None => None,
        };
        let _guard = self.locks.acquire(owner).await?;

        let mut cart = open_cart(&self.store, &self.sessions, owner);
        match product {
            Some(product) => cart.update_quantity(&product, quantity).await?,
            None => cart.remove_item(product_id).await?,
        }
        record_mutation("update");

        Ok(CartView::from_lines(cart.lines().await?)?)
    }

    /// Removes a line; no-op if absent.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn remove_item(&self, owner: CartOwner, product_id: &ProductId) -> Result<CartView> {
        let _guard = self.locks.acquire(owner).await?;

        let mut cart = open_cart(&self.store, &self.sessions, owner);
        cart.remove_item(product_id).await?;
        record_mutation("remove");

        Ok(CartView::from_lines(cart.lines().await?)?)
    }

    /// Empties the owner's cart.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn clear(&self, owner: CartOwner) -> Result<()> {
        let _guard = self.locks.acquire(owner).await?;

        open_cart(&self.store, &self.sessions, owner).clear().await?;
        record_mutation("clear");
        Ok(())
    }

    async fn product(&self, product_id: &ProductId) -> Result<Product> {
        self.store
            .find_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::ResourceNotFound {
                resource: format!("product {product_id}"),
            })
    }
}

fn record_mutation(op: &'static str) {
    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
}
