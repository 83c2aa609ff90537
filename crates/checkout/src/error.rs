//! Checkout error types.

use domain::{CartError, Money, OrderError, ProductId};
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while mutating a cart or placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Requested quantity exceeds available stock.
    #[error(
        "Insufficient stock for {product_name}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// Checkout was attempted on a cart without lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A product referenced by the cart no longer exists.
    #[error("{resource} no longer exists")]
    ResourceNotFound { resource: String },

    /// A cart or row lock could not be acquired in time. Retryable.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// The cart no longer matches what checkout is about to commit.
    #[error("Cart changed during checkout: {reason}")]
    CartChanged { reason: String },

    /// Adding zero units to a cart.
    #[error("Quantity for {product_id} must be greater than 0")]
    InvalidQuantity { product_id: ProductId },

    /// A line subtotal or the cart total exceeds what [`Money`] can hold.
    #[error("Cart total exceeds the largest supported amount")]
    TotalOverflow,

    /// The order could not be built from the cart.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Store error not covered by the variants above.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CheckoutError {
    pub(crate) fn cart_total_changed(cart_total: Money, order_total: Money) -> Self {
        CheckoutError::CartChanged {
            reason: format!("cart total {cart_total}, order total {order_total}"),
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::LockTimeout { .. })
    }

    /// Short, stable label used as the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::ResourceNotFound { .. } => "resource_not_found",
            CheckoutError::LockTimeout { .. } => "lock_timeout",
            CheckoutError::CartChanged { .. } => "cart_changed",
            CheckoutError::InvalidQuantity { .. } => "invalid_quantity",
            CheckoutError::TotalOverflow => "total_overflow",
            CheckoutError::Order(_) => "order",
            CheckoutError::Store(_) => "store",
        }
    }

    /// Message safe to show to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InsufficientStock {
                product_name,
                available,
                requested,
                ..
            } => format!(
                "Only {available} of {product_name} available, but {requested} requested. Please adjust your cart."
            ),
            CheckoutError::EmptyCart => "Your cart is empty.".to_string(),
            CheckoutError::ResourceNotFound { .. } => {
                "Some items in your cart are no longer available. Please review your cart."
                    .to_string()
            }
            CheckoutError::LockTimeout { .. } => {
                "We are busy right now. Please try again in a moment.".to_string()
            }
            CheckoutError::CartChanged { .. } => {
                "Your cart changed during checkout. Please review your cart.".to_string()
            }
            CheckoutError::InvalidQuantity { .. } => {
                "Quantity must be greater than zero.".to_string()
            }
            CheckoutError::TotalOverflow => {
                "Your cart total is too large. Please reduce the quantities.".to_string()
            }
            CheckoutError::Order(_) | CheckoutError::Store(_) => {
                "Something went wrong while placing your order.".to_string()
            }
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            },
            CartError::InvalidQuantity { product_id } => {
                CheckoutError::InvalidQuantity { product_id }
            }
            CartError::TotalOverflow => CheckoutError::TotalOverflow,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { resource } => CheckoutError::LockTimeout { resource },
            StoreError::ProductNotFound(product_id) => CheckoutError::ResourceNotFound {
                resource: format!("product {product_id}"),
            },
            StoreError::StockUnderflow {
                product_id,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                product_name: product_id.to_string(),
                product_id,
                available,
                requested,
            },
            other => CheckoutError::Store(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
