//! In-memory cart held for an anonymous session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CartError, CartLine, cart_total, ensure_available, merged_quantity, total_with};
use crate::order::{Money, ProductId};
use crate::product::Product;

/// Cart keyed by product ID, each line holding a product snapshot.
///
/// Never persisted. Every line has quantity ≥ 1 and there is at most one line
/// per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCart {
    lines: BTreeMap<ProductId, CartLine>,
}

impl SessionCart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` units, merging into an existing line.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        let existing = self.quantity_of(&product.id);
        let merged = merged_quantity(product, existing, quantity)?;
        self.store(CartLine::for_product(product, merged))
    }

    /// Overwrites the quantity of a line; zero or less removes it.
    pub fn update_quantity(&mut self, product: &Product, quantity: i64) -> Result<(), CartError> {
        let Some(quantity) = super::positive_quantity(quantity) else {
            self.remove_item(&product.id);
            return Ok(());
        };
        ensure_available(product, quantity)?;
        self.store(CartLine::for_product(product, quantity))
    }

    fn store(&mut self, line: CartLine) -> Result<(), CartError> {
        total_with(&self.lines(), &line)?;
        self.lines.insert(line.product_id.clone(), line);
        Ok(())
    }

    /// Removes a line; no-op if absent.
    pub fn remove_item(&mut self, product_id: &ProductId) {
        self.lines.remove(product_id);
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Returns the lines ordered by product ID.
    pub fn lines(&self) -> Vec<CartLine> {
        self.lines.values().cloned().collect()
    }

    /// Returns the quantity queued for a product, zero if absent.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.lines
            .get(product_id)
            .map(|line| line.quantity)
            .unwrap_or(0)
    }

    /// Returns the exact total of all lines.
    pub fn total_amount(&self) -> Result<Money, CartError> {
        cart_total(&self.lines())
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }
}
