//! Checkout orchestration for the storefront.
//!
//! A checkout runs as one store transaction through these states:
//! 1. Validating: every cart line still matches the catalog and stock
//! 2. Pricing: totals are computed and an optional coupon applied
//! 3. Reserving: stock is decremented per variant
//! 4. Persisting: the order snapshot and coupon redemption are written
//!
//! Any failure rolls the transaction back, so no partial order or stock
//! change survives. Clearing the cart and notifying happen after commit and
//! never undo a placed order.
//!
//! [`ReconciliationJob`] repairs stale carts out of band.

pub mod error;
pub mod orchestrator;
pub mod order_number;
pub mod reconciliation;
pub mod services;
pub mod state;

pub use error::{CheckoutError, Result};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest};
pub use reconciliation::{
    Adjustment, ReconciliationJob, ReconciliationReport, RemovalReason, SweepReport,
};
pub use services::{
    InMemoryNotificationService, LoggingNotificationService, NotificationService, OrderPlaced,
};
pub use state::{CheckoutAttempt, CheckoutState};
