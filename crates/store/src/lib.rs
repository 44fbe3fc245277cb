//! Transactional storage layer for the storefront checkout engine.
//!
//! Every unit of work runs inside an explicit [`Transaction`] obtained from a
//! [`Store`]. Row locks taken through the transaction (inventory, coupons,
//! carts) are held until it commits, rolls back or is dropped.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PgStore, PgTransaction};
pub use query::{CouponQuery, ProductQuery};
pub use records::{
    CartLineRecord, CouponRecord, CouponRedemption, DiscountType, InventoryRecord, OrderLineRecord,
    OrderRecord, OrderStatus, ProductRecord,
};
pub use store::{DEFAULT_LOCK_TIMEOUT, Store, Transaction};
