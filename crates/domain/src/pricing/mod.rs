//! Cart totals: subtotal, VAT, shipping tier and coupon discount.

mod coupon;

pub use coupon::{AppliedCoupon, coupon_discount, evaluate_coupon};

use common::{CartIdentity, Money};
use serde::{Deserialize, Serialize};
use store::Transaction;

use crate::cart::CartLineView;
use crate::error::Result;

/// Tax and shipping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub currency: String,
    /// VAT rate in basis points (1000 = 10%).
    pub vat_basis_points: i64,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Money,
    /// Subtotal at or above which the reduced fee applies.
    pub reduced_shipping_threshold: Money,
    pub reduced_shipping_fee: Money,
    pub standard_shipping_fee: Money,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "VND".to_string(),
            vat_basis_points: 1_000,
            free_shipping_threshold: Money::new(500_000),
            reduced_shipping_threshold: Money::new(200_000),
            reduced_shipping_fee: Money::new(15_000),
            standard_shipping_fee: Money::new(30_000),
        }
    }
}

/// Derived totals of a cart. Never stored; recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    /// Lines counted towards the totals (active products only).
    pub item_count: usize,
    pub total_quantity: u64,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub grand_total: Money,
    pub currency: String,
    pub coupon_code: Option<String>,
}

impl CartSummary {
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Returns a copy with `discount` applied, capped at the subtotal.
    pub fn with_discount(&self, discount: Money, coupon_code: Option<String>) -> CartSummary {
        let discount = discount.max(Money::zero()).min(self.subtotal);
        CartSummary {
            discount,
            grand_total: self.subtotal + self.tax + self.shipping - discount,
            coupon_code,
            ..self.clone()
        }
    }
}

/// Computes cart summaries from captured line prices.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Shipping fee for a subtotal; zero when nothing is billable.
    pub fn shipping_fee(&self, subtotal: Money, has_items: bool) -> Money {
        if !has_items {
            Money::zero()
        } else if subtotal >= self.config.free_shipping_threshold {
            Money::zero()
        } else if subtotal >= self.config.reduced_shipping_threshold {
            self.config.reduced_shipping_fee
        } else {
            self.config.standard_shipping_fee
        }
    }

    pub fn tax(&self, subtotal: Money) -> Money {
        subtotal.basis_points_rounded(self.config.vat_basis_points)
    }

    /// Totals over the lines whose product is active. Inactive lines stay in
    /// the cart listing but contribute nothing.
    pub fn summarize(&self, lines: &[CartLineView]) -> CartSummary {
        let billable: Vec<&CartLineView> = lines.iter().filter(|l| l.product_active).collect();

        let subtotal: Money = billable.iter().map(|l| l.line.line_total()).sum();
        let total_quantity: u64 = billable.iter().map(|l| u64::from(l.line.quantity)).sum();
        let tax = self.tax(subtotal);
        let shipping = self.shipping_fee(subtotal, !billable.is_empty());

        CartSummary {
            item_count: billable.len(),
            total_quantity,
            subtotal,
            tax,
            shipping,
            discount: Money::zero(),
            grand_total: subtotal + tax + shipping,
            currency: self.config.currency.clone(),
            coupon_code: None,
        }
    }

    /// Validates `code` against `summary` and returns the discounted summary.
    ///
    /// With `lock` the coupon row stays locked for the rest of `tx`, so usage
    /// counting serializes with concurrent checkouts. A coupon found past its
    /// validity window is deactivated through `tx`; the caller must commit
    /// `tx` for that to stick.
    #[tracing::instrument(skip(self, tx, summary, identity), fields(identity = %identity))]
    pub async fn apply_coupon(
        &self,
        tx: &mut dyn Transaction,
        code: &str,
        summary: &CartSummary,
        identity: &CartIdentity,
        lock: bool,
    ) -> Result<AppliedCoupon> {
        coupon::apply(tx, code, summary, identity, lock, chrono::Utc::now()).await
    }
}
