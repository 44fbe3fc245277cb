use chrono::{DateTime, Utc};
use common::Money;

use crate::{CouponRecord, DiscountType, ProductRecord};

/// Typed filter for catalog reads.
///
/// Every field is bound as a parameter by the PostgreSQL backend; the
/// in-memory backend evaluates [`ProductQuery::matches`] directly.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Filter by exact category.
    pub category: Option<String>,

    /// Filter by minimum price (inclusive).
    pub min_price: Option<Money>,

    /// Filter by maximum price (inclusive).
    pub max_price: Option<Money>,

    /// Filter by active flag.
    pub active: Option<bool>,

    /// Maximum number of products to return.
    pub limit: Option<usize>,

    /// Number of products to skip.
    pub offset: Option<usize>,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn min_price(mut self, price: Money) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn max_price(mut self, price: Money) -> Self {
        self.max_price = Some(price);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true when `product` passes every filter (paging ignored).
    pub fn matches(&self, product: &ProductRecord) -> bool {
        if let Some(category) = &self.category
            && &product.category != category
        {
            return false;
        }
        if let Some(min) = self.min_price
            && product.price < min
        {
            return false;
        }
        if let Some(max) = self.max_price
            && product.price > max
        {
            return false;
        }
        if let Some(active) = self.active
            && product.is_active != active
        {
            return false;
        }
        true
    }
}

/// Typed filter for coupon scans (expiry sweeps, admin listings).
#[derive(Debug, Clone, Default)]
pub struct CouponQuery {
    /// Filter by active flag.
    pub active: Option<bool>,

    /// Coupons whose validity window contains this instant.
    pub valid_at: Option<DateTime<Utc>>,

    /// Coupons whose `valid_until` is strictly before this instant.
    pub expired_before: Option<DateTime<Utc>>,

    pub discount_type: Option<DiscountType>,

    pub limit: Option<usize>,
}

impl CouponQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active coupons already past their validity window at `now`.
    pub fn stale_active(now: DateTime<Utc>) -> Self {
        Self::new().active(true).expired_before(now)
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn valid_at(mut self, at: DateTime<Utc>) -> Self {
        self.valid_at = Some(at);
        self
    }

    pub fn expired_before(mut self, at: DateTime<Utc>) -> Self {
        self.expired_before = Some(at);
        self
    }

    pub fn discount_type(mut self, discount_type: DiscountType) -> Self {
        self.discount_type = Some(discount_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, coupon: &CouponRecord) -> bool {
        if let Some(active) = self.active
            && coupon.is_active != active
        {
            return false;
        }
        if let Some(at) = self.valid_at
            && (at < coupon.valid_from || at > coupon.valid_until)
        {
            return false;
        }
        if let Some(at) = self.expired_before
            && coupon.valid_until >= at
        {
            return false;
        }
        if let Some(discount_type) = self.discount_type
            && coupon.discount_type != discount_type
        {
            return false;
        }
        true
    }
}
