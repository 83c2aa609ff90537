use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::SessionId;
use domain::{CartError, CartLine, Product, ProductId, SessionCart};
use tokio::sync::RwLock;

use super::Cart;
use crate::error::Result;

/// Session carts of every live anonymous session, held in process memory.
///
/// Nothing here is persisted; a cart disappears with its session, either
/// explicitly through [`SessionCarts::end_session`] or once it has been idle
/// longer than the session TTL (see [`SessionCarts::evict_idle`]).
#[derive(Debug, Clone, Default)]
pub struct SessionCarts {
    carts: Arc<RwLock<HashMap<SessionId, Entry>>>,
}

#[derive(Debug)]
struct Entry {
    cart: SessionCart,
    last_access: Instant,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            cart: SessionCart::new(),
            last_access: Instant::now(),
        }
    }
}

impl SessionCarts {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the cart of `session_id`.
    pub fn handle(&self, session_id: SessionId) -> SessionCartHandle {
        SessionCartHandle {
            carts: self.clone(),
            session_id,
        }
    }

    /// Returns a copy of the cart of `session_id`; empty if none exists.
    ///
    /// Reading counts as activity and keeps the session alive.
    pub async fn snapshot(&self, session_id: SessionId) -> SessionCart {
        let mut carts = self.carts.write().await;
        match carts.get_mut(&session_id) {
            Some(entry) => {
                entry.last_access = Instant::now();
                entry.cart.clone()
            }
            None => SessionCart::new(),
        }
    }

    /// Drops the cart of an ended session.
    pub async fn end_session(&self, session_id: SessionId) {
        self.carts.write().await.remove(&session_id);
    }

    /// Drops every cart not read or written for longer than `max_age` and
    /// returns how many were dropped.
    pub async fn evict_idle(&self, max_age: Duration) -> usize {
        let mut carts = self.carts.write().await;
        let before = carts.len();
        carts.retain(|_, entry| entry.last_access.elapsed() <= max_age);
        let evicted = before - carts.len();

        if evicted > 0 {
            metrics::counter!("session_carts_evicted_total").increment(evicted as u64);
            tracing::debug!(evicted, "evicted idle session carts");
        }
        evicted
    }

    /// Returns the number of sessions holding a non-empty cart.
    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }

    /// Returns true if no session holds a non-empty cart.
    pub async fn is_empty(&self) -> bool {
        self.carts.read().await.is_empty()
    }

    async fn update<T>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut SessionCart) -> std::result::Result<T, CartError>,
    ) -> std::result::Result<T, CartError> {
        let mut carts = self.carts.write().await;
        let entry = carts.entry(session_id).or_default();
        entry.last_access = Instant::now();
        let result = f(&mut entry.cart);
        if entry.cart.is_empty() {
            carts.remove(&session_id);
        }
        result
    }
}

/// [`Cart`] over one session's entry in [`SessionCarts`].
#[derive(Debug, Clone)]
pub struct SessionCartHandle {
    carts: SessionCarts,
    session_id: SessionId,
}

impl SessionCartHandle {
    /// Returns the session this cart belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

#[async_trait]
impl Cart for SessionCartHandle {
    async fn lines(&self) -> Result<Vec<CartLine>> {
        Ok(self.carts.snapshot(self.session_id).await.lines())
    }

    async fn add_item(&mut self, product: &Product, quantity: u32) -> Result<()> {
        self.carts
            .update(self.session_id, |cart| cart.add_item(product, quantity))
            .await?;
        Ok(())
    }

    async fn update_quantity(&mut self, product: &Product, quantity: i64) -> Result<()> {
        self.carts
            .update(self.session_id, |cart| cart.update_quantity(product, quantity))
            .await?;
        Ok(())
    }

    async fn remove_item(&mut self, product_id: &ProductId) -> Result<()> {
        self.carts
            .update(self.session_id, |cart| {
                cart.remove_item(product_id);
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.carts.end_session(self.session_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use domain::Money;

    fn widget(available: u32) -> Product {
        Product::new("SKU-001", "Widget", "", Money::from_cents(999), available)
    }

    #[tokio::test]
    async fn test_handles_share_the_session_cart() {
        let carts = SessionCarts::new();
        let session = SessionId::new();

        carts.handle(session).add_item(&widget(10), 2).await.unwrap();
        let lines = carts.handle(session).lines().await.unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let carts = SessionCarts::new();
        carts
            .handle(SessionId::new())
            .add_item(&widget(10), 2)
            .await
            .unwrap();

        let other = carts.handle(SessionId::new());
        assert!(other.lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_add_leaves_no_empty_entry() {
        let carts = SessionCarts::new();
        let mut cart = carts.handle(SessionId::new());

        let result = cart.add_item(&widget(1), 5).await;

        assert!(matches!(
            result,
            Err(CheckoutError::InsufficientStock { .. })
        ));
        assert!(carts.is_empty().await);
    }

    #[tokio::test]
    async fn test_end_session_drops_cart() {
        let carts = SessionCarts::new();
        let session = SessionId::new();
        carts.handle(session).add_item(&widget(10), 1).await.unwrap();

        carts.end_session(session).await;

        assert!(carts.snapshot(session).await.is_empty());
        assert_eq!(carts.len().await, 0);
    }

    #[tokio::test]
    async fn test_total_amount_uses_default_method() {
        let carts = SessionCarts::new();
        let mut cart = carts.handle(SessionId::new());
        cart.add_item(&widget(10), 3).await.unwrap();

        assert_eq!(cart.total_amount().await.unwrap(), Money::from_cents(2997));
    }

    #[tokio::test]
    async fn test_evict_idle_drops_only_stale_carts() {
        let carts = SessionCarts::new();
        let idle = SessionId::new();
        let active = SessionId::new();
        carts.handle(idle).add_item(&widget(10), 1).await.unwrap();
        carts.handle(active).add_item(&widget(10), 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        carts.handle(active).lines().await.unwrap();

        let evicted = carts.evict_idle(Duration::from_millis(40)).await;

        assert_eq!(evicted, 1);
        assert!(carts.snapshot(idle).await.is_empty());
        assert_eq!(carts.snapshot(active).await.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_recent_carts() {
        let carts = SessionCarts::new();
        carts
            .handle(SessionId::new())
            .add_item(&widget(10), 1)
            .await
            .unwrap();

        assert_eq!(carts.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(carts.len().await, 1);
    }
}
