//! Stock counts per purchasable variant.

use common::VariantKey;
use store::Transaction;

use crate::error::{DomainError, Result};

/// Availability checks and atomic decrements against inventory records.
///
/// Missing and inactive records count as zero stock.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Sellable units of `variant`, read without locking.
    pub async fn available(&self, tx: &mut dyn Transaction, variant: &VariantKey) -> Result<i64> {
        Ok(tx
            .get_inventory(variant)
            .await?
            .map(|record| record.sellable())
            .unwrap_or(0))
    }

    /// Whether `quantity` units could be sold right now. Advisory only: the
    /// answer may be stale by the time a checkout reserves.
    pub async fn check_availability(
        &self,
        tx: &mut dyn Transaction,
        variant: &VariantKey,
        quantity: u32,
    ) -> Result<bool> {
        Ok(self.available(tx, variant).await? >= i64::from(quantity))
    }

    /// Removes `quantity` units from `variant`, returning the remaining stock.
    ///
    /// The record stays locked until `tx` finishes, and the write is discarded
    /// if `tx` rolls back.
    #[tracing::instrument(skip(self, tx, variant), fields(variant = %variant))]
    pub async fn decrement(
        &self,
        tx: &mut dyn Transaction,
        variant: &VariantKey,
        quantity: u32,
    ) -> Result<i64> {
        let requested = i64::from(quantity);
        let record = tx.lock_inventory(variant).await?;
        let available = record.as_ref().map(|r| r.sellable()).unwrap_or(0);

        let Some(record) = record.filter(|_| available >= requested) else {
            return Err(DomainError::InsufficientStock {
                variant: variant.clone(),
                available,
                requested,
            });
        };

        let remaining = record.stock_quantity - requested;
        tx.update_stock(variant, remaining).await?;
        metrics::counter!("inventory_decrements_total").increment(1);
        tracing::debug!(remaining, "stock decremented");
        Ok(remaining)
    }
}
