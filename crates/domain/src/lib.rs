//! Domain layer for the storefront checkout engine.
//!
//! This crate provides:
//! - `InventoryLedger` for availability checks and locked stock decrements
//! - `PricingEngine` for cart totals and coupon validation
//! - `CartStore` for per-identity cart mutations and guest cart merges

pub mod cart;
pub mod error;
pub mod inventory;
pub mod pricing;
pub mod tx;

pub use cart::{CartLineView, CartStore, CartView, MergeReport, QuantityUpdate};
pub use error::{CouponError, DomainError, LineIssue, LineIssueKind, Result};
pub use inventory::InventoryLedger;
pub use pricing::{
    AppliedCoupon, CartSummary, PricingConfig, PricingEngine, coupon_discount, evaluate_coupon,
};
pub use tx::settle;
