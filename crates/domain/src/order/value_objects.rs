//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::product::Product;

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount represented in cents to avoid floating point issues.
///
/// All arithmetic is exact integer arithmetic on minor units, so sums of line
/// subtotals never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Adds another amount, returning `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

/// A frozen line of a placed order.
///
/// Holds a copy of the product data as it was at purchase time, so later
/// catalog edits never change what the customer bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name at purchase time.
    pub product_name: String,

    /// Product description at purchase time.
    pub description: String,

    /// Price per unit at purchase time.
    pub unit_price: Money,

    /// Quantity ordered.
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        description: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            description: description.into(),
            unit_price,
            quantity,
        }
    }

    /// Freezes the current state of `product` into a line.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            description: product.description.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    /// Returns the subtotal for this line (quantity * unit_price).
    pub fn subtotal(&self) -> Result<Money, OrderError> {
        self.unit_price
            .checked_multiply(self.quantity)
            .ok_or(OrderError::TotalOverflow)
    }
}

/// Delivery details copied onto the order at checkout.
///
/// This is a snapshot, not a reference to an address book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub recipient_name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingDetails {
    /// Creates shipping details.
    pub fn new(
        recipient_name: impl Into<String>,
        email: impl Into<String>,
        street: impl Into<String>,
        city: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            email: email.into(),
            street: street.into(),
            city: city.into(),
            postal_code: postal_code.into(),
            country: country.into(),
        }
    }
}
