//! The cart contract and its two implementations.
//!
//! Guests get a [`SessionCartHandle`] over process memory; registered users
//! get a [`PersistentCart`] over store rows. [`open_cart`] picks one by owner.

mod persistent;
mod session;

pub use persistent::PersistentCart;
pub use session::{SessionCartHandle, SessionCarts};

use async_trait::async_trait;
use domain::cart::cart_total;
use domain::{CartLine, CartOwner, Money, Product, ProductId};
use order_store::Store;

use crate::error::Result;

/// Operations every cart supports, whoever owns it.
///
/// Availability checks here are advisory: they read the stock ledger without
/// locking and never change it. Callers serialize mutations of one cart
/// through [`CartLocks`](crate::CartLocks).
#[async_trait]
pub trait Cart: Send + Sync {
    /// Returns the cart lines.
    async fn lines(&self) -> Result<Vec<CartLine>>;

    /// Adds `quantity` units of `product`, merging into an existing line.
    async fn add_item(&mut self, product: &Product, quantity: u32) -> Result<()>;

    /// Overwrites the quantity of a line; zero or less removes it.
    async fn update_quantity(&mut self, product: &Product, quantity: i64) -> Result<()>;

    /// Removes a line; no-op if absent.
    async fn remove_item(&mut self, product_id: &ProductId) -> Result<()>;

    /// Removes every line.
    async fn clear(&mut self) -> Result<()>;

    /// Exact sum of line subtotals; zero for an empty cart.
    async fn total_amount(&self) -> Result<Money> {
        Ok(cart_total(&self.lines().await?)?)
    }
}

/// Opens the cart belonging to `owner`.
pub fn open_cart<'a, S: Store>(
    store: &'a S,
    sessions: &'a SessionCarts,
    owner: CartOwner,
) -> Box<dyn Cart + 'a> {
    match owner {
        CartOwner::Guest(session_id) => Box::new(sessions.handle(session_id)),
        CartOwner::User(user_id) => Box::new(PersistentCart::new(store, user_id)),
    }
}
