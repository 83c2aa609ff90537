//! Checkout orchestrator: cart to order in one unit of work.

use std::collections::HashMap;
use std::time::Instant;

use common::OrderId;
use domain::cart::cart_total;
use domain::{
    CartLine, CartOwner, Money, Order, OrderError, OrderLine, OrderSummary, Product, ProductId,
    ShippingDetails,
};
use order_store::{CartRow, Store, UnitOfWork};

use crate::cart::{SessionCarts, open_cart};
use crate::error::{CheckoutError, Result};
use crate::locks::CartLocks;
use crate::notifier::{Notifier, PostCommitNotifier};
use crate::post_commit::PostCommitQueue;

/// Converts carts into orders.
///
/// For one checkout the orchestrator:
/// 1. Takes the cart lock (and, for persistent carts, the cart row locks)
/// 2. Locks every product row in ascending id order and re-checks stock
/// 3. Builds the order from the locked products and compares totals
/// 4. Decrements stock and inserts the order in the same unit of work
/// 5. Commits, clears the cart, then fires the confirmation
///
/// Any failure before the commit rolls the unit of work back, leaving stock,
/// orders and the cart untouched.
pub struct CheckoutOrchestrator<S, N>
where
    S: Store,
    N: Notifier,
{
    store: S,
    sessions: SessionCarts,
    locks: CartLocks,
    notifier: PostCommitNotifier<N>,
}

impl<S, N> CheckoutOrchestrator<S, N>
where
    S: Store,
    N: Notifier,
{
    /// Creates a new orchestrator sharing `sessions` and `locks` with the cart
    /// service.
    pub fn new(
        store: S,
        sessions: SessionCarts,
        locks: CartLocks,
        notifier: PostCommitNotifier<N>,
    ) -> Self {
        Self {
            store,
            sessions,
            locks,
            notifier,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the post-commit notifier.
    pub fn notifier(&self) -> &PostCommitNotifier<N> {
        &self.notifier
    }

    /// Places an order from `owner`'s cart and returns its id.
    #[tracing::instrument(skip(self, owner, shipping), fields(owner = %owner))]
    pub async fn place_order(
        &self,
        owner: CartOwner,
        shipping: ShippingDetails,
    ) -> Result<OrderId> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = self.try_place_order(owner, shipping).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(order_id) => {
                metrics::counter!("checkout_succeeded_total").increment(1);
                tracing::info!(%order_id, "order placed");
            }
            Err(err) => {
                metrics::counter!("checkout_failed_total", "reason" => err.reason()).increment(1);
                match err {
                    CheckoutError::Order(_) | CheckoutError::Store(_) => {
                        tracing::error!(error = %err, "checkout failed");
                    }
                    _ => tracing::info!(error = %err, "checkout rejected"),
                }
            }
        }

        result
    }

    async fn try_place_order(
        &self,
        owner: CartOwner,
        shipping: ShippingDetails,
    ) -> Result<OrderId> {
        let _cart_guard = self.locks.acquire(owner).await?;

        let mut cart = open_cart(&self.store, &self.sessions, owner);
        let lines = cart.lines().await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut tx = self.store.begin().await?;
        let mut hooks = PostCommitQueue::new();

        let order_id = match self
            .stage_order(&mut tx, owner, &lines, shipping, &mut hooks)
            .await
        {
            Ok(order_id) => order_id,
            Err(err) => {
                hooks.discard();
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            hooks.discard();
            return Err(err.into());
        }

        // Persistent carts were drained inside the unit of work. The order is
        // committed here, so a failed session clear must not fail it.
        if let CartOwner::Guest(_) = owner {
            if let Err(err) = cart.clear().await {
                tracing::warn!(%order_id, error = %err, "failed to clear session cart");
            }
        }

        hooks.fire();
        Ok(order_id)
    }

    async fn stage_order(
        &self,
        tx: &mut S::Tx,
        owner: CartOwner,
        lines: &[CartLine],
        shipping: ShippingDetails,
        hooks: &mut PostCommitQueue,
    ) -> Result<OrderId> {
        if let CartOwner::User(user_id) = owner {
            let rows = tx.lock_cart(user_id).await?;
            ensure_rows_match(&rows, lines)?;
        }

        let products = lock_products(tx, lines).await?;

        let order_lines = lines
            .iter()
            .map(|line| {
                products
                    .get(&line.product_id)
                    .map(|product| OrderLine::snapshot(product, line.quantity))
                    .ok_or_else(|| not_found(&line.product_id))
            })
            .collect::<Result<Vec<_>>>()?;

        let expected: Money = cart_total(lines)?;
        let order =
            Order::place(owner.user_id(), shipping, order_lines).map_err(|err| match err {
                OrderError::TotalOverflow => CheckoutError::TotalOverflow,
                other => other.into(),
            })?;

        if order.total_amount() != expected {
            return Err(CheckoutError::cart_total_changed(
                expected,
                order.total_amount(),
            ));
        }

        for line in order.lines() {
            tx.decrement_stock(&line.product_id, line.quantity).await?;
        }
        tx.insert_order(&order).await?;

        if let CartOwner::User(user_id) = owner {
            tx.clear_cart(user_id).await?;
        }

        self.notifier
            .schedule(OrderSummary::from(&order), Some(hooks));

        tracing::debug!(
            order_id = %order.id(),
            total = %order.total_amount(),
            lines = order.lines().len(),
            "order staged"
        );
        Ok(order.id())
    }
}

/// Locks each product row once, in ascending product-id order, and checks
/// that it can supply the requested quantity.
async fn lock_products<T: UnitOfWork>(
    tx: &mut T,
    lines: &[CartLine],
) -> Result<HashMap<ProductId, Product>> {
    let mut sorted: Vec<&CartLine> = lines.iter().collect();
    sorted.sort_by(|a, b| a.product_id.cmp(&b.product_id));

    let mut products = HashMap::with_capacity(sorted.len());
    for line in sorted {
        let product = tx
            .lock_product(&line.product_id)
            .await?
            .ok_or_else(|| not_found(&line.product_id))?;

        if !product.can_supply(line.quantity) {
            return Err(CheckoutError::InsufficientStock {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                available: product.available_quantity,
                requested: line.quantity,
            });
        }

        products.insert(line.product_id.clone(), product);
    }

    Ok(products)
}

fn ensure_rows_match(rows: &[CartRow], lines: &[CartLine]) -> Result<()> {
    let matches = rows.len() == lines.len()
        && lines.iter().all(|line| {
            rows.iter()
                .any(|row| row.product_id == line.product_id && row.quantity == line.quantity)
        });

    if matches {
        Ok(())
    } else {
        Err(CheckoutError::CartChanged {
            reason: "cart rows changed since they were read".to_string(),
        })
    }
}

fn not_found(product_id: &ProductId) -> CheckoutError {
    CheckoutError::ResourceNotFound {
        resource: format!("product {product_id}"),
    }
}
