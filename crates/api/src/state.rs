//! Shared application state.

use std::sync::Arc;

use checkout::{CheckoutOrchestrator, NotificationService, ReconciliationJob};
use domain::{CartStore, PricingEngine};
use store::Store;

/// Store handle shared by every service.
pub type SharedStore = Arc<dyn Store>;

/// Notification collaborator shared by checkouts.
pub type SharedNotifier = Arc<dyn NotificationService>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: SharedStore,
    pub carts: CartStore<SharedStore>,
    pub checkout: CheckoutOrchestrator<SharedStore, SharedNotifier>,
    pub reconciliation: ReconciliationJob<SharedStore>,
}

impl AppState {
    pub fn new(store: SharedStore, pricing: PricingEngine, notifier: SharedNotifier) -> Self {
        Self {
            carts: CartStore::new(Arc::clone(&store), pricing.clone()),
            checkout: CheckoutOrchestrator::new(Arc::clone(&store), pricing, notifier),
            reconciliation: ReconciliationJob::new(Arc::clone(&store)),
            store,
        }
    }
}
