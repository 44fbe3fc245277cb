//! Shared identifiers and value types used across the storefront workspace.

pub mod attributes;
pub mod money;
pub mod types;

pub use attributes::{AttributeError, AttributeSet};
pub use money::Money;
pub use types::{CartIdentity, CartLineId, OrderId, ProductId, SessionId, UserId, VariantKey};
