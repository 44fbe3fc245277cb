//! Turns a cart into a committed order.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{CartIdentity, CartLineId, Money, OrderId, VariantKey};
use domain::{
    CartLineView, CartSummary, DomainError, InventoryLedger, LineIssue, LineIssueKind,
    PricingEngine,
};
use serde::Serialize;
use store::{
    CouponRecord, CouponRedemption, OrderLineRecord, OrderRecord, OrderStatus, Store, Transaction,
};

use crate::error::{CheckoutError, Result};
use crate::order_number;
use crate::services::notification::{NotificationService, OrderPlaced};
use crate::state::{CheckoutAttempt, CheckoutState};

/// Everything needed to place an order for one cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub identity: CartIdentity,
    pub coupon_code: Option<String>,
    pub shipping_address: String,
    pub payment_method: String,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub order_number: String,
    pub grand_total: Money,
    pub summary: CartSummary,
    /// Non-fatal problems, such as a rejected coupon.
    pub warnings: Vec<String>,
}

/// Output of the transactional part of a checkout.
struct PlacedOrder {
    order: OrderRecord,
    line_ids: Vec<CartLineId>,
    summary: CartSummary,
    warnings: Vec<String>,
}

/// Runs checkouts against a store.
///
/// Stock, order rows and coupon usage are written in a single transaction.
/// Clearing the cart and notifying happen after commit; their failures are
/// logged and the order stands.
pub struct CheckoutOrchestrator<S, N>
where
    S: Store,
    N: NotificationService,
{
    store: S,
    pricing: PricingEngine,
    inventory: InventoryLedger,
    notifier: N,
}

impl<S, N> CheckoutOrchestrator<S, N>
where
    S: Store,
    N: NotificationService,
{
    pub fn new(store: S, pricing: PricingEngine, notifier: N) -> Self {
        Self {
            store,
            pricing,
            inventory: InventoryLedger::new(),
            notifier,
        }
    }

    /// Validates, prices, reserves and persists the cart of `request.identity`.
    #[tracing::instrument(skip(self, request), fields(identity = %request.identity))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run(&request).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    order_number = %receipt.order_number,
                    grand_total = %receipt.grand_total,
                    duration,
                    "checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, reason = e.reason(), "checkout failed");
            }
        }
        result
    }

    /// Loads an order placed by `identity`. Orders of other identities are
    /// reported as not found.
    pub async fn order(&self, identity: &CartIdentity, order_id: OrderId) -> Result<OrderRecord> {
        let mut tx = self.store.begin().await?;
        let order = tx.get_order(order_id).await;
        tx.rollback().await?;

        match order? {
            Some(order) if &order.identity == identity => Ok(order),
            _ => Err(DomainError::not_found("order", order_id).into()),
        }
    }

    async fn run(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        validate_request(request)?;

        let mut attempt = CheckoutAttempt::new();
        let mut tx = self.store.begin().await?;

        let placed = match self.place_order(tx.as_mut(), &mut attempt, request).await {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                attempt.fail();
                return Err(e);
            }
        };
        if let Err(e) = tx.commit().await {
            attempt.fail();
            return Err(e.into());
        }
        attempt.advance(CheckoutState::Completed)?;

        self.after_commit(&placed.order, &placed.line_ids).await;

        Ok(CheckoutReceipt {
            order_id: placed.order.id,
            order_number: placed.order.order_number,
            grand_total: placed.order.grand_total,
            summary: placed.summary,
            warnings: placed.warnings,
        })
    }

    async fn place_order(
        &self,
        tx: &mut dyn Transaction,
        attempt: &mut CheckoutAttempt,
        request: &CheckoutRequest,
    ) -> Result<PlacedOrder> {
        let identity = &request.identity;

        let lines = self.validate(tx, identity).await?;

        attempt.advance(CheckoutState::Pricing)?;
        let mut warnings = Vec::new();
        let base = self.pricing.summarize(&lines);
        let (summary, coupon) = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                match self
                    .pricing
                    .apply_coupon(tx, code, &base, identity, true)
                    .await
                {
                    Ok(applied) => (applied.summary, Some(applied.coupon)),
                    Err(DomainError::Coupon(e)) => {
                        tracing::warn!(coupon = code, reason = e.reason(), "coupon dropped from checkout");
                        warnings.push(e.to_string());
                        (base, None)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ => (base, None),
        };

        attempt.advance(CheckoutState::Reserving)?;
        for (variant, quantity) in demand_by_variant(&lines)? {
            self.inventory.decrement(tx, &variant, quantity).await?;
        }

        attempt.advance(CheckoutState::Persisting)?;
        let order = build_order(request, &lines, &summary);
        tx.insert_order(&order).await?;
        if let Some(coupon) = coupon {
            redeem(tx, coupon, &order).await?;
        }

        Ok(PlacedOrder {
            order,
            line_ids: lines.iter().map(|view| view.line.id).collect(),
            summary,
            warnings,
        })
    }

    /// Locks the cart and checks every line against the catalog and stock.
    async fn validate(
        &self,
        tx: &mut dyn Transaction,
        identity: &CartIdentity,
    ) -> Result<Vec<CartLineView>> {
        tx.lock_cart(identity).await?;
        let lines = tx.cart_lines(identity).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut views = Vec::with_capacity(lines.len());
        for line in lines {
            let product = tx.get_product(&line.product_id).await?;
            views.push(CartLineView::from_product(line, product.as_ref()));
        }

        let demand = demand_by_variant(&views)?;
        let mut available = BTreeMap::new();
        for variant in demand.keys() {
            available.insert(variant.clone(), self.inventory.available(tx, variant).await?);
        }

        let mut issues = Vec::new();
        for view in &views {
            let kind = match view.current_price {
                None => Some(LineIssueKind::ProductMissing),
                Some(_) if !view.product_active => Some(LineIssueKind::ProductInactive),
                Some(current) if view.price_changed() => Some(LineIssueKind::PriceChanged {
                    captured: view.line.unit_price,
                    current,
                }),
                Some(_) => {
                    let variant = view.line.variant();
                    let requested = demand.get(&variant).copied().map(i64::from).unwrap_or(0);
                    let available = available.get(&variant).copied().unwrap_or(0);
                    (available < requested).then_some(LineIssueKind::InsufficientStock {
                        available,
                        requested,
                    })
                }
            };
            if let Some(kind) = kind {
                issues.push(LineIssue {
                    line_id: view.line.id,
                    product_id: view.line.product_id.clone(),
                    kind,
                });
            }
        }

        if let Some(shortfall) = stock_shortfall(&issues, &views) {
            return Err(shortfall.into());
        }
        if !issues.is_empty() {
            return Err(DomainError::Conflict(issues).into());
        }
        Ok(views)
    }

    async fn after_commit(&self, order: &OrderRecord, ordered_lines: &[CartLineId]) {
        if let Err(e) = self.clear_cart(&order.identity, ordered_lines).await {
            tracing::warn!(order_id = %order.id, error = %e, "cart clear failed after checkout");
        }

        let message = OrderPlaced {
            order_id: order.id,
            order_number: order.order_number.clone(),
            identity: order.identity.clone(),
            grand_total: order.grand_total,
            currency: order.currency.clone(),
        };
        if let Err(e) = self.notifier.order_placed(&message).await {
            tracing::warn!(order_id = %order.id, error = %e, "order notification failed");
        }
    }

    /// Removes the lines that went into the order. Lines added after the
    /// order committed stay in the cart.
    async fn clear_cart(&self, identity: &CartIdentity, ordered_lines: &[CartLineId]) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_cart(identity).await?;
            tx.remove_cart_lines(identity, ordered_lines).await
        }
        .await;
        match result {
            Ok(removed) => {
                tx.commit().await?;
                Ok(removed)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e.into())
            }
        }
    }
}

fn validate_request(request: &CheckoutRequest) -> Result<()> {
    if request.shipping_address.trim().is_empty() {
        return Err(CheckoutError::Validation(
            "shipping address must not be blank".to_string(),
        ));
    }
    if request.payment_method.trim().is_empty() {
        return Err(CheckoutError::Validation(
            "payment method must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// A failure caused only by missing stock, reported for the first short
/// variant.
fn stock_shortfall(issues: &[LineIssue], views: &[CartLineView]) -> Option<DomainError> {
    let stock_only = issues
        .iter()
        .all(|issue| matches!(issue.kind, LineIssueKind::InsufficientStock { .. }));
    if !stock_only {
        return None;
    }

    let issue = issues.first()?;
    let LineIssueKind::InsufficientStock {
        available,
        requested,
    } = issue.kind
    else {
        return None;
    };
    let view = views.iter().find(|view| view.line.id == issue.line_id)?;
    Some(DomainError::InsufficientStock {
        variant: view.line.variant(),
        available,
        requested,
    })
}

/// Total quantity per variant, in lock order.
fn demand_by_variant(lines: &[CartLineView]) -> Result<BTreeMap<VariantKey, u32>> {
    let mut demand: BTreeMap<VariantKey, u32> = BTreeMap::new();
    for view in lines {
        let entry = demand.entry(view.line.variant()).or_default();
        *entry = entry.checked_add(view.line.quantity).ok_or_else(|| {
            CheckoutError::Validation(format!("quantity of {} is too large", view.line.product_id))
        })?;
    }
    Ok(demand)
}

fn build_order(request: &CheckoutRequest, lines: &[CartLineView], summary: &CartSummary) -> OrderRecord {
    let id = OrderId::new();
    let created_at = Utc::now();

    let lines = lines
        .iter()
        .map(|view| OrderLineRecord {
            product_id: view.line.product_id.clone(),
            product_name: view
                .product_name
                .clone()
                .unwrap_or_else(|| view.line.product_id.to_string()),
            attributes: view.line.attributes.clone(),
            quantity: view.line.quantity,
            unit_price: view.line.unit_price,
            line_total: view.line_total,
        })
        .collect();

    OrderRecord {
        id,
        order_number: order_number::generate(created_at, id),
        identity: request.identity.clone(),
        status: OrderStatus::Pending,
        subtotal: summary.subtotal,
        tax: summary.tax,
        shipping: summary.shipping,
        discount: summary.discount,
        grand_total: summary.grand_total,
        currency: summary.currency.clone(),
        coupon_code: summary.coupon_code.clone(),
        shipping_address: request.shipping_address.trim().to_string(),
        payment_method: request.payment_method.trim().to_string(),
        created_at,
        lines,
    }
}

async fn redeem(tx: &mut dyn Transaction, mut coupon: CouponRecord, order: &OrderRecord) -> Result<()> {
    coupon.used_count += 1;
    tx.save_coupon(&coupon).await?;
    tx.insert_redemption(&CouponRedemption {
        coupon_code: coupon.code.clone(),
        order_id: order.id,
        user_id: order.identity.user_id(),
        redeemed_at: order.created_at,
    })
    .await?;
    Ok(())
}
