//! Checkout error types.

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::state::CheckoutState;

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Request rejected before any storage access.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The state machine was asked to move somewhere it cannot go.
    #[error("Invalid checkout transition from {from} to {to}")]
    InvalidTransition {
        from: CheckoutState,
        to: CheckoutState,
    },

    /// The notification collaborator refused the message.
    #[error("Notification failed: {0}")]
    Notification(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CheckoutError {
    /// Returns true when the caller may retry the checkout from scratch.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Domain(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Metric label for failed checkouts.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::Validation(_) => "validation",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
            CheckoutError::Notification(_) => "notification",
            CheckoutError::Domain(e) => match e {
                DomainError::Validation(_) => "validation",
                DomainError::NotFound { .. } => "not_found",
                DomainError::ProductUnavailable(_) | DomainError::Conflict(_) => "conflict",
                DomainError::InsufficientStock { .. } => "insufficient_stock",
                DomainError::Coupon(_) => "coupon",
                DomainError::Busy(_) => "busy",
                DomainError::Store(_) => "store",
            },
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        CheckoutError::Domain(e.into())
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_busy_is_retryable() {
        let err: CheckoutError = StoreError::Busy {
            resource: "inventory TEE/M".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.reason(), "busy");
    }

    #[test]
    fn empty_cart_is_final() {
        assert!(!CheckoutError::EmptyCart.is_retryable());
        assert_eq!(CheckoutError::EmptyCart.reason(), "empty_cart");
    }
}
