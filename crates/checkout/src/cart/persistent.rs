use async_trait::async_trait;
use common::UserId;
use domain::cart::{ensure_available, merged_quantity, positive_quantity, total_with};
use domain::{CartLine, Product, ProductId};
use order_store::{CartRow, Store};

use super::Cart;
use crate::error::{CheckoutError, Result};

/// [`Cart`] over a registered user's cart rows in the store.
///
/// Lines are joined with the live catalog on every read, so names and prices
/// are always current.
pub struct PersistentCart<'a, S> {
    store: &'a S,
    user_id: UserId,
}

impl<'a, S: Store> PersistentCart<'a, S> {
    /// Opens the cart of `user_id`.
    pub fn new(store: &'a S, user_id: UserId) -> Self {
        Self { store, user_id }
    }

    /// Returns the owning user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Writes the row for `product` once the resulting cart total is known to fit.
    async fn store_line(&self, current: &[CartLine], product: &Product, quantity: u32) -> Result<()> {
        total_with(current, &CartLine::for_product(product, quantity))?;
        self.store
            .upsert_cart_row(self.user_id, &CartRow::new(product.id.clone(), quantity))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S: Store> Cart for PersistentCart<'_, S> {
    async fn lines(&self) -> Result<Vec<CartLine>> {
        let rows = self.store.cart_rows(self.user_id).await?;
        let mut lines = Vec::with_capacity(rows.len());

        for row in rows {
            let product = self.store.find_product(&row.product_id).await?.ok_or_else(|| {
                CheckoutError::ResourceNotFound {
                    resource: format!("product {}", row.product_id),
                }
            })?;
            lines.push(CartLine::for_product(&product, row.quantity));
        }

        Ok(lines)
    }

    async fn add_item(&mut self, product: &Product, quantity: u32) -> Result<()> {
        let current = self.lines().await?;
        let existing = current
            .iter()
            .find(|line| line.product_id == product.id)
            .map(|line| line.quantity)
            .unwrap_or(0);
        let merged = merged_quantity(product, existing, quantity)?;
        self.store_line(&current, product, merged).await
    }

    async fn update_quantity(&mut self, product: &Product, quantity: i64) -> Result<()> {
        let Some(quantity) = positive_quantity(quantity) else {
            return self.remove_item(&product.id).await;
        };
        ensure_available(product, quantity)?;
        let current = self.lines().await?;
        self.store_line(&current, product, quantity).await
    }

    async fn remove_item(&mut self, product_id: &ProductId) -> Result<()> {
        self.store.delete_cart_row(self.user_id, product_id).await?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.store.clear_cart_rows(self.user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Money;
    use order_store::InMemoryStore;

    fn widget(available: u32) -> Product {
        Product::new("SKU-001", "Widget", "", Money::from_cents(999), available)
    }

    #[tokio::test]
    async fn test_add_merges_into_stored_row() {
        let store = InMemoryStore::new();
        store.put_product(&widget(10)).await.unwrap();
        let user = UserId::new();
        let mut cart = PersistentCart::new(&store, user);

        cart.add_item(&widget(10), 2).await.unwrap();
        cart.add_item(&widget(10), 3).await.unwrap();

        assert_eq!(
            store.cart_rows(user).await.unwrap(),
            vec![CartRow::new("SKU-001", 5)]
        );
    }

    #[tokio::test]
    async fn test_lines_reflect_live_catalog() {
        let store = InMemoryStore::new();
        store.put_product(&widget(10)).await.unwrap();
        let user = UserId::new();
        let mut cart = PersistentCart::new(&store, user);
        cart.add_item(&widget(10), 2).await.unwrap();

        store
            .put_product(&Product::new(
                "SKU-001",
                "Widget",
                "",
                Money::from_cents(1099),
                10,
            ))
            .await
            .unwrap();

        assert_eq!(cart.total_amount().await.unwrap(), Money::from_cents(2198));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_row() {
        let store = InMemoryStore::new();
        store.put_product(&widget(10)).await.unwrap();
        let user = UserId::new();
        let mut cart = PersistentCart::new(&store, user);
        cart.add_item(&widget(10), 2).await.unwrap();

        cart.update_quantity(&widget(10), 0).await.unwrap();
        cart.update_quantity(&widget(10), 0).await.unwrap();

        assert!(cart.lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_product_surfaces_as_not_found() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        store
            .upsert_cart_row(user, &CartRow::new("SKU-404", 1))
            .await
            .unwrap();

        let cart = PersistentCart::new(&store, user);
        let result = cart.lines().await;

        assert!(matches!(
            result,
            Err(CheckoutError::ResourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overflowing_total_is_not_written() {
        let store = InMemoryStore::new();
        let yacht = Product::new("SKU-900", "Yacht", "", Money::from_cents(i64::MAX / 2), 10);
        store.put_product(&widget(10)).await.unwrap();
        store.put_product(&yacht).await.unwrap();
        let user = UserId::new();
        let mut cart = PersistentCart::new(&store, user);
        cart.add_item(&widget(10), 1).await.unwrap();

        let result = cart.add_item(&yacht, 2).await;

        assert!(matches!(result, Err(CheckoutError::TotalOverflow)));
        assert_eq!(
            store.cart_rows(user).await.unwrap(),
            vec![CartRow::new("SKU-001", 1)]
        );
    }
}
