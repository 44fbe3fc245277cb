use chrono::{DateTime, Utc};
use common::{CartIdentity, Money};
use serde::Serialize;
use store::{CouponRecord, DiscountType, Transaction};

use super::CartSummary;
use crate::error::{CouponError, DomainError, Result};

/// A coupon that passed validation, with the summary it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    pub coupon: CouponRecord,
    pub discount: Money,
    pub summary: CartSummary,
}

/// Raw discount a coupon grants on `summary`, capped at the subtotal.
pub fn coupon_discount(coupon: &CouponRecord, summary: &CartSummary) -> Money {
    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let discount = summary.subtotal.percent_floor(coupon.value);
            match coupon.max_discount_amount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        DiscountType::FixedAmount => Money::new(coupon.value),
        DiscountType::FreeShipping => summary.shipping,
    };
    discount.max(Money::zero()).min(summary.subtotal)
}

/// Checks a coupon against a cart at `now`, stopping at the first failed rule.
///
/// `customer_redemptions` is the number of earlier redemptions by the same
/// registered customer; `None` skips the per-customer cap (guests).
pub fn evaluate_coupon(
    coupon: &CouponRecord,
    summary: &CartSummary,
    customer_redemptions: Option<i64>,
    now: DateTime<Utc>,
) -> std::result::Result<Money, CouponError> {
    let code = coupon.code.clone();

    if !coupon.is_active {
        return Err(CouponError::Inactive(code));
    }
    if now < coupon.valid_from {
        return Err(CouponError::NotYetActive {
            code,
            starts_at: coupon.valid_from,
        });
    }
    if now > coupon.valid_until {
        return Err(CouponError::Expired {
            code,
            deactivated: false,
        });
    }
    if summary.subtotal < coupon.min_order_amount {
        return Err(CouponError::BelowMinimum {
            code,
            minimum: coupon.min_order_amount,
            subtotal: summary.subtotal,
        });
    }
    if let Some(limit) = coupon.usage_limit_total
        && coupon.used_count >= limit
    {
        return Err(CouponError::UsageExceeded(code));
    }
    if let (Some(limit), Some(used)) = (coupon.usage_limit_per_customer, customer_redemptions)
        && used >= limit
    {
        return Err(CouponError::CustomerUsageExceeded(code));
    }

    Ok(coupon_discount(coupon, summary))
}

fn reject(err: CouponError) -> DomainError {
    metrics::counter!("coupon_rejections_total", "reason" => err.reason()).increment(1);
    DomainError::Coupon(err)
}

pub(super) async fn apply(
    tx: &mut dyn Transaction,
    code: &str,
    summary: &CartSummary,
    identity: &CartIdentity,
    lock: bool,
    now: DateTime<Utc>,
) -> Result<AppliedCoupon> {
    let code = CouponRecord::normalize_code(code);
    if code.is_empty() {
        return Err(DomainError::Validation(
            "coupon code must not be blank".to_string(),
        ));
    }

    let coupon = if lock {
        tx.lock_coupon(&code).await?
    } else {
        tx.get_coupon(&code).await?
    };
    let Some(coupon) = coupon else {
        return Err(reject(CouponError::NotFound(code)));
    };

    let customer_redemptions = match (identity.user_id(), coupon.usage_limit_per_customer) {
        (Some(user_id), Some(_)) => Some(tx.count_redemptions(&code, user_id).await?),
        _ => None,
    };

    match evaluate_coupon(&coupon, summary, customer_redemptions, now) {
        Ok(discount) => {
            let summary = summary.with_discount(discount, Some(code));
            Ok(AppliedCoupon {
                discount: summary.discount,
                summary,
                coupon,
            })
        }
        Err(CouponError::Expired { code, .. }) => {
            tx.deactivate_coupon(&code).await?;
            tracing::warn!(coupon = %code, valid_until = %coupon.valid_until, "expired coupon deactivated");
            Err(reject(CouponError::Expired {
                code,
                deactivated: true,
            }))
        }
        Err(e) => Err(reject(e)),
    }
}
