//! Cart contents and the acceptance rules shared by every cart backend.

mod owner;
mod session;

pub use owner::{CartOwner, IdentityProvider};
pub use session::SessionCart;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Money, ProductId};
use crate::product::Product;

/// Errors raised while mutating a cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The requested quantity exceeds what the ledger currently shows.
    #[error(
        "Insufficient stock for {product_name}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// Adding zero units is rejected instead of creating an empty line.
    #[error("Quantity for {product_id} must be greater than 0")]
    InvalidQuantity { product_id: ProductId },

    /// A line subtotal or the cart total no longer fits in [`Money`].
    #[error("Cart total exceeds the largest supported amount")]
    TotalOverflow,
}

/// One product line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl CartLine {
    /// Creates a line from the product as currently observed.
    pub fn for_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    /// Returns the subtotal for this line (quantity * unit_price).
    pub fn subtotal(&self) -> Result<Money, CartError> {
        self.unit_price
            .checked_multiply(self.quantity)
            .ok_or(CartError::TotalOverflow)
    }
}

/// Returns the exact total of `lines`; zero for an empty cart.
pub fn cart_total(lines: &[CartLine]) -> Result<Money, CartError> {
    lines.iter().try_fold(Money::zero(), |total, line| {
        total
            .checked_add(line.subtotal()?)
            .ok_or(CartError::TotalOverflow)
    })
}

/// Returns the total `lines` would have with `candidate` replacing the line
/// for the same product.
///
/// Called before a line is stored, so a cart never holds a total it cannot
/// represent.
pub fn total_with(lines: &[CartLine], candidate: &CartLine) -> Result<Money, CartError> {
    lines
        .iter()
        .filter(|line| line.product_id != candidate.product_id)
        .try_fold(candidate.subtotal()?, |total, line| {
            total
                .checked_add(line.subtotal()?)
                .ok_or(CartError::TotalOverflow)
        })
}

/// Returns the quantity a line holds after adding `added` units to `existing`.
///
/// Advisory check only: availability may change before checkout.
pub fn merged_quantity(product: &Product, existing: u32, added: u32) -> Result<u32, CartError> {
    if added == 0 {
        return Err(CartError::InvalidQuantity {
            product_id: product.id.clone(),
        });
    }
    let requested = existing.saturating_add(added);
    ensure_available(product, requested)?;
    Ok(requested)
}

/// Fails with [`CartError::InsufficientStock`] if `requested` exceeds
/// availability, or [`CartError::TotalOverflow`] if the line subtotal would.
pub fn ensure_available(product: &Product, requested: u32) -> Result<(), CartError> {
    if !product.can_supply(requested) {
        return Err(CartError::InsufficientStock {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            available: product.available_quantity,
            requested,
        });
    }
    product
        .price
        .checked_multiply(requested)
        .map(|_| ())
        .ok_or(CartError::TotalOverflow)
}

/// Clamps a signed quantity update: anything at or below zero means "remove".
pub fn positive_quantity(quantity: i64) -> Option<u32> {
    if quantity <= 0 {
        None
    } else {
        Some(u32::try_from(quantity).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(available: u32) -> Product {
        Product::new("SKU-001", "Widget", "", Money::from_cents(999), available)
    }

    #[test]
    fn merged_quantity_sums_existing_and_added() {
        assert_eq!(merged_quantity(&widget(10), 3, 4), Ok(7));
    }

    #[test]
    fn merged_quantity_counts_already_queued_units() {
        let err = merged_quantity(&widget(5), 3, 3).unwrap_err();
        assert_eq!(
            err,
            CartError::InsufficientStock {
                product_id: ProductId::new("SKU-001"),
                product_name: "Widget".to_string(),
                available: 5,
                requested: 6,
            }
        );
    }

    #[test]
    fn merged_quantity_rejects_zero() {
        assert!(matches!(
            merged_quantity(&widget(5), 0, 0),
            Err(CartError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn insufficient_stock_message_names_product_and_availability() {
        let err = ensure_available(&widget(2), 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Widget: 2 available, 3 requested"
        );
    }

    #[test]
    fn positive_quantity_treats_non_positive_as_removal() {
        assert_eq!(positive_quantity(0), None);
        assert_eq!(positive_quantity(-4), None);
        assert_eq!(positive_quantity(7), Some(7));
        assert_eq!(positive_quantity(i64::MAX), Some(u32::MAX));
    }

    #[test]
    fn cart_total_of_empty_cart_is_zero() {
        assert_eq!(cart_total(&[]), Ok(Money::zero()));
    }

    #[test]
    fn oversized_line_subtotal_is_rejected() {
        let yacht = Product::new("SKU-900", "Yacht", "", Money::from_cents(i64::MAX / 2), 10);
        assert_eq!(ensure_available(&yacht, 2), Ok(()));
        assert_eq!(merged_quantity(&yacht, 2, 1), Err(CartError::TotalOverflow));
    }

    #[test]
    fn cart_total_overflow_is_an_error() {
        let line = CartLine::for_product(
            &Product::new("SKU-900", "Yacht", "", Money::from_cents(i64::MAX / 2), 10),
            2,
        );
        let other = CartLine {
            product_id: ProductId::new("SKU-901"),
            ..line.clone()
        };
        assert!(cart_total(std::slice::from_ref(&line)).is_ok());
        assert_eq!(cart_total(&[line, other]), Err(CartError::TotalOverflow));
    }

    #[test]
    fn total_with_replaces_the_candidate_product() {
        let lines = vec![
            CartLine::for_product(&widget(10), 2),
            CartLine::for_product(
                &Product::new("SKU-002", "Gadget", "", Money::from_cents(2550), 10),
                1,
            ),
        ];
        let candidate = CartLine::for_product(&widget(10), 5);
        assert_eq!(
            total_with(&lines, &candidate),
            Ok(Money::from_cents(5 * 999 + 2550))
        );
    }
}
