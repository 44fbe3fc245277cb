//! Notification service trait and implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{CartIdentity, Money, OrderId};
use serde::Serialize;

use crate::error::CheckoutError;

/// Message sent once an order is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub identity: CartIdentity,
    pub grand_total: Money,
    pub currency: String,
}

/// Delivers order notifications. Failures are reported but never undo the order.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn order_placed(&self, message: &OrderPlaced) -> Result<(), CheckoutError>;
}

#[async_trait]
impl<N: NotificationService + ?Sized> NotificationService for Arc<N> {
    async fn order_placed(&self, message: &OrderPlaced) -> Result<(), CheckoutError> {
        (**self).order_placed(message).await
    }
}

/// Writes each notification to the log. Used by the server binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationService;

#[async_trait]
impl NotificationService for LoggingNotificationService {
    async fn order_placed(&self, message: &OrderPlaced) -> Result<(), CheckoutError> {
        tracing::info!(
            order_id = %message.order_id,
            order_number = %message.order_number,
            identity = %message.identity,
            grand_total = %message.grand_total,
            "order notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<OrderPlaced>,
    fail_on_send: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<Mutex<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryNotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the service to reject every message.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state().fail_on_send = fail;
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    pub fn sent(&self) -> Vec<OrderPlaced> {
        self.state().sent.clone()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn order_placed(&self, message: &OrderPlaced) -> Result<(), CheckoutError> {
        let mut state = self.state();
        if state.fail_on_send {
            return Err(CheckoutError::Notification(
                "notification channel unavailable".to_string(),
            ));
        }
        state.sent.push(message.clone());
        Ok(())
    }
}
