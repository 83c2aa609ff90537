//! Order aggregate and related types.

mod aggregate;
mod state;
mod summary;
mod value_objects;

pub use aggregate::Order;
pub use state::{OrderStatus, UnknownStatus};
pub use summary::OrderSummary;
pub use value_objects::{Money, OrderLine, ProductId, ShippingDetails};

use thiserror::Error;

/// Errors that can occur while building or advancing an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// An order needs at least one line.
    #[error("Order has no lines")]
    NoLines,

    /// A line was given a zero quantity.
    #[error("Invalid quantity for {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: String },

    /// A line was given a negative unit price.
    #[error("Invalid price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: String, price: i64 },

    /// The order total does not fit in the money representation.
    #[error("Order total overflows")]
    TotalOverflow,

    /// The requested status change is not a forward transition.
    #[error("Invalid status transition: cannot {action} from {current} status")]
    InvalidStatusTransition {
        current: OrderStatus,
        action: &'static str,
    },
}
