//! Domain error types.

use chrono::{DateTime, Utc};
use common::{AttributeError, CartLineId, Money, ProductId, VariantKey};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Why a cart line cannot be checked out as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LineIssueKind {
    ProductMissing,
    ProductInactive,
    InsufficientStock { available: i64, requested: i64 },
    PriceChanged { captured: Money, current: Money },
}

/// One offending cart line, reported by checkout validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineIssue {
    pub line_id: CartLineId,
    pub product_id: ProductId,
    #[serde(flatten)]
    pub kind: LineIssueKind,
}

impl std::fmt::Display for LineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            LineIssueKind::ProductMissing => write!(f, "{} no longer exists", self.product_id),
            LineIssueKind::ProductInactive => write!(f, "{} is not available", self.product_id),
            LineIssueKind::InsufficientStock {
                available,
                requested,
            } => write!(
                f,
                "{}: {available} in stock, {requested} requested",
                self.product_id
            ),
            LineIssueKind::PriceChanged { captured, current } => write!(
                f,
                "{}: price changed from {captured} to {current}",
                self.product_id
            ),
        }
    }
}

/// Reasons a coupon cannot be applied, in validation order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon {0} not found")]
    NotFound(String),

    #[error("Coupon {0} is not active")]
    Inactive(String),

    #[error("Coupon {code} is valid from {starts_at}")]
    NotYetActive {
        code: String,
        starts_at: DateTime<Utc>,
    },

    /// Past `valid_until`. `deactivated` is true when this attempt switched the
    /// coupon off.
    #[error("Coupon {code} has expired")]
    Expired { code: String, deactivated: bool },

    #[error("Coupon {code} requires a subtotal of at least {minimum} (cart: {subtotal})")]
    BelowMinimum {
        code: String,
        minimum: Money,
        subtotal: Money,
    },

    #[error("Coupon {0} has reached its usage limit")]
    UsageExceeded(String),

    #[error("Coupon {0} has already been used the maximum number of times by this customer")]
    CustomerUsageExceeded(String),
}

impl CouponError {
    /// Metric label and machine-readable code.
    pub fn reason(&self) -> &'static str {
        match self {
            CouponError::NotFound(_) => "not_found",
            CouponError::Inactive(_) => "inactive",
            CouponError::NotYetActive { .. } => "not_yet_active",
            CouponError::Expired { .. } => "expired",
            CouponError::BelowMinimum { .. } => "below_minimum",
            CouponError::UsageExceeded(_) => "usage_exceeded",
            CouponError::CustomerUsageExceeded(_) => "customer_usage_exceeded",
        }
    }

    /// True for both the global and the per-customer usage cap.
    pub fn is_usage_exceeded(&self) -> bool {
        matches!(
            self,
            CouponError::UsageExceeded(_) | CouponError::CustomerUsageExceeded(_)
        )
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input rejected before any storage access.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Product {0} is not available")]
    ProductUnavailable(ProductId),

    /// The cart no longer matches the catalog.
    #[error("Cart has {} stale line(s)", .0.len())]
    Conflict(Vec<LineIssue>),

    #[error("Insufficient stock for {variant}: {available} available, {requested} requested")]
    InsufficientStock {
        variant: VariantKey,
        available: i64,
        requested: i64,
    },

    #[error(transparent)]
    Coupon(#[from] CouponError),

    /// A lock could not be acquired in time; the whole operation may be retried.
    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::Busy(_) => true,
            DomainError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy { resource } => DomainError::Busy(resource),
            other => DomainError::Store(other),
        }
    }
}

impl From<AttributeError> for DomainError {
    fn from(e: AttributeError) -> Self {
        DomainError::Validation(e.to_string())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
