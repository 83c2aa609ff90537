//! Live catalog product as seen by the checkout pipeline.

use serde::{Deserialize, Serialize};

use crate::order::{Money, ProductId};

/// A catalog product together with its stock ledger entry.
///
/// `available_quantity` is the ledger value. Catalog management sets it
/// directly; checkout only ever decrements it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub available_quantity: u32,
}

impl Product {
    /// Creates a product.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        description: impl Into<String>,
        price: Money,
        available_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            price,
            available_quantity,
        }
    }

    /// Returns true if `quantity` units can be taken from the ledger.
    pub fn can_supply(&self, quantity: u32) -> bool {
        quantity <= self.available_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_supply_up_to_available_quantity() {
        let product = Product::new("SKU-001", "Widget", "", Money::from_cents(999), 3);
        assert!(product.can_supply(0));
        assert!(product.can_supply(3));
        assert!(!product.can_supply(4));
    }
}
