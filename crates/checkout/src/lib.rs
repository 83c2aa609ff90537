//! Cart-to-order commit pipeline.
//!
//! Carts come in two forms behind one [`Cart`] trait: session carts for
//! anonymous visitors and persistent carts for registered users. The
//! [`CheckoutOrchestrator`] turns a cart into an order:
//! 1. Lock the cart
//! 2. Re-read every product under a row lock and re-check stock
//! 3. Decrement stock and insert the order in one unit of work
//! 4. Clear the cart and hand the confirmation to the [`PostCommitNotifier`]
//!
//! Any failure before the commit rolls the whole unit of work back.

pub mod cart;
pub mod cart_service;
pub mod config;
pub mod error;
pub mod locks;
pub mod notifier;
pub mod orchestrator;
pub mod post_commit;

pub use cart::{Cart, PersistentCart, SessionCartHandle, SessionCarts, open_cart};
pub use cart_service::{CartService, CartView};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, Result};
pub use locks::{CartGuard, CartLocks};
pub use notifier::{InMemoryNotifier, LogNotifier, Notifier, NotifyError, PostCommitNotifier};
pub use orchestrator::CheckoutOrchestrator;
pub use post_commit::PostCommitQueue;
