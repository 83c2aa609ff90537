//! Domain layer for the checkout pipeline.
//!
//! This crate provides the pure domain model:
//! - Money, product and order value objects
//! - The immutable Order aggregate with its forward-only status machine
//! - Cart lines, the cart acceptance rules, and the session cart

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{CartError, CartLine, CartOwner, IdentityProvider, SessionCart};
pub use order::{
    Money, Order, OrderError, OrderLine, OrderStatus, OrderSummary, ProductId, ShippingDetails,
    UnknownStatus,
};
pub use product::Product;
