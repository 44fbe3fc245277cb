//! Out-of-band repair of stale carts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CartIdentity, CartLineId, Money, ProductId, VariantKey};
use domain::InventoryLedger;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use store::{CouponQuery, Store, Transaction};

use crate::error::{CheckoutError, Result};

/// How many carts a sweep reconciles at once.
const SWEEP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    ProductMissing,
    ProductInactive,
    OutOfStock,
}

/// One change made to a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Adjustment {
    Removed {
        line_id: CartLineId,
        product_id: ProductId,
        reason: RemovalReason,
    },
    QuantityClamped {
        line_id: CartLineId,
        product_id: ProductId,
        from: u32,
        to: u32,
    },
    PriceRestamped {
        line_id: CartLineId,
        product_id: ProductId,
        from: Money,
        to: Money,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub identity: CartIdentity,
    pub adjustments: Vec<Adjustment>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.adjustments.is_empty()
    }
}

/// Totals of one sweep over every cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub carts_checked: usize,
    pub carts_adjusted: usize,
    pub adjustments: usize,
    pub failures: usize,
}

/// Brings carts back in line with the catalog and stock, independent of checkout.
#[derive(Clone)]
pub struct ReconciliationJob<S: Store> {
    store: S,
    inventory: InventoryLedger,
}

impl<S: Store> ReconciliationJob<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            inventory: InventoryLedger::new(),
        }
    }

    /// Repairs one cart in a single transaction.
    ///
    /// Lines of missing or inactive products and of sold-out variants are
    /// removed; quantities above stock are lowered; drifted prices are
    /// re-stamped. Lines sharing a variant draw from the same stock, in cart
    /// order.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn reconcile_cart(&self, identity: &CartIdentity) -> Result<ReconciliationReport> {
        let mut tx = self.store.begin().await?;
        let result = self.reconcile_in(tx.as_mut(), identity).await;
        let adjustments = match result {
            Ok(adjustments) => {
                tx.commit().await?;
                adjustments
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                return Err(e);
            }
        };

        if !adjustments.is_empty() {
            metrics::counter!("reconciliation_adjustments_total")
                .increment(adjustments.len() as u64);
            tracing::info!(adjustments = adjustments.len(), "cart reconciled");
        }
        Ok(ReconciliationReport {
            identity: identity.clone(),
            adjustments,
        })
    }

    async fn reconcile_in(
        &self,
        tx: &mut dyn Transaction,
        identity: &CartIdentity,
    ) -> Result<Vec<Adjustment>> {
        tx.lock_cart(identity).await?;

        let mut adjustments = Vec::new();
        let mut remaining: HashMap<VariantKey, i64> = HashMap::new();

        for mut line in tx.cart_lines(identity).await? {
            let product = tx.get_product(&line.product_id).await?;
            let removal = match &product {
                None => Some(RemovalReason::ProductMissing),
                Some(p) if !p.is_active => Some(RemovalReason::ProductInactive),
                Some(_) => None,
            };
            if let Some(reason) = removal {
                tx.delete_cart_line(line.id).await?;
                adjustments.push(Adjustment::Removed {
                    line_id: line.id,
                    product_id: line.product_id,
                    reason,
                });
                continue;
            }

            let variant = line.variant();
            let budget = match remaining.get(&variant) {
                Some(budget) => *budget,
                None => self.inventory.available(tx, &variant).await?,
            };
            if budget <= 0 {
                remaining.insert(variant, 0);
                tx.delete_cart_line(line.id).await?;
                adjustments.push(Adjustment::Removed {
                    line_id: line.id,
                    product_id: line.product_id,
                    reason: RemovalReason::OutOfStock,
                });
                continue;
            }

            let mut changed = false;
            if i64::from(line.quantity) > budget {
                let clamped = u32::try_from(budget).unwrap_or(u32::MAX);
                adjustments.push(Adjustment::QuantityClamped {
                    line_id: line.id,
                    product_id: line.product_id.clone(),
                    from: line.quantity,
                    to: clamped,
                });
                line.quantity = clamped;
                changed = true;
            }
            remaining.insert(variant, budget - i64::from(line.quantity));

            if let Some(current) = product.map(|p| p.price)
                && current != line.unit_price
            {
                adjustments.push(Adjustment::PriceRestamped {
                    line_id: line.id,
                    product_id: line.product_id.clone(),
                    from: line.unit_price,
                    to: current,
                });
                line.unit_price = current;
                changed = true;
            }

            if changed {
                line.updated_at = Utc::now();
                tx.save_cart_line(&line).await?;
            }
        }

        Ok(adjustments)
    }

    /// Reconciles every cart that currently has lines. A cart that fails is
    /// logged and counted; the sweep carries on.
    #[tracing::instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let identities = {
            let mut tx = self.store.begin().await?;
            let identities = tx.cart_identities().await;
            tx.rollback().await?;
            identities?
        };

        let outcomes: Vec<(CartIdentity, Result<ReconciliationReport>)> = stream::iter(identities)
            .map(|identity| async move {
                let outcome = self.reconcile_cart(&identity).await;
                (identity, outcome)
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (identity, outcome) in outcomes {
            report.carts_checked += 1;
            match outcome {
                Ok(cart) if cart.is_clean() => {}
                Ok(cart) => {
                    report.carts_adjusted += 1;
                    report.adjustments += cart.adjustments.len();
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(identity = %identity, error = %e, "cart reconciliation failed");
                }
            }
        }

        tracing::info!(
            carts_checked = report.carts_checked,
            carts_adjusted = report.carts_adjusted,
            failures = report.failures,
            "reconciliation sweep complete"
        );
        Ok(report)
    }

    /// Deactivates active coupons whose validity ended before `now`, returning
    /// their codes.
    #[tracing::instrument(skip(self))]
    pub async fn expire_coupons(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let stale = tx.find_coupons(&CouponQuery::stale_active(now)).await?;
            let mut codes = Vec::with_capacity(stale.len());
            for stale_coupon in stale {
                let Some(coupon) = tx.lock_coupon(&stale_coupon.code).await? else {
                    continue;
                };
                if !coupon.is_active || coupon.valid_until >= now {
                    continue;
                }
                tx.deactivate_coupon(&coupon.code).await?;
                tracing::warn!(coupon = %coupon.code, valid_until = %coupon.valid_until, "expired coupon deactivated");
                codes.push(coupon.code);
            }
            Ok::<_, CheckoutError>(codes)
        }
        .await;

        match result {
            Ok(codes) => {
                tx.commit().await?;
                Ok(codes)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }
}
