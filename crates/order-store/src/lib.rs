//! Persistence for the checkout pipeline.
//!
//! The [`Store`] trait covers lock-free reads and single-statement cart row
//! writes. [`UnitOfWork`] is one transaction: it takes row locks that are held
//! until [`UnitOfWork::commit`] or [`UnitOfWork::rollback`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use store::{CartRow, Store, UnitOfWork};
