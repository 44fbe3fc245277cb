//! Row types persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    AttributeSet, CartIdentity, CartLineId, Money, OrderId, ProductId, UserId, VariantKey,
};
use serde::{Deserialize, Serialize};

/// Catalog row as seen by the checkout engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Current selling price.
    pub price: Money,
    pub is_active: bool,
}

impl ProductRecord {
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            price,
            is_active: true,
        }
    }
}

/// Stock count for one purchasable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub variant: VariantKey,
    pub stock_quantity: i64,
    pub is_active: bool,
}

impl InventoryRecord {
    pub fn new(variant: VariantKey, stock_quantity: i64) -> Self {
        Self {
            variant,
            stock_quantity,
            is_active: true,
        }
    }

    /// Units that can currently be sold from this record.
    pub fn sellable(&self) -> i64 {
        if self.is_active {
            self.stock_quantity.max(0)
        } else {
            0
        }
    }
}

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a whole percentage of the subtotal.
    Percentage,
    /// `value` is an absolute amount.
    FixedAmount,
    /// Waives the shipping fee; `value` is ignored.
    FreeShipping,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::FixedAmount => "fixed_amount",
            DiscountType::FreeShipping => "free_shipping",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percentage" => Some(DiscountType::Percentage),
            "fixed_amount" => Some(DiscountType::FixedAmount),
            "free_shipping" => Some(DiscountType::FreeShipping),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRecord {
    /// Upper-cased coupon code.
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_order_amount: Money,
    pub max_discount_amount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit_total: Option<i64>,
    pub usage_limit_per_customer: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
}

impl CouponRecord {
    /// Normalizes a user-supplied code to its stored form.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

/// One order that consumed a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRedemption {
    pub coupon_code: String,
    pub order_id: OrderId,
    pub user_id: Option<UserId>,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRecord {
    pub id: CartLineId,
    pub identity: CartIdentity,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price captured when the line was added (re-stamped on re-add).
    pub unit_price: Money,
    pub attributes: AttributeSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLineRecord {
    pub fn new(
        identity: CartIdentity,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        attributes: AttributeSet,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CartLineId::new(),
            identity,
            product_id,
            quantity,
            unit_price,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inventory record this line draws from.
    pub fn variant(&self) -> VariantKey {
        VariantKey::for_selection(&self.product_id, &self.attributes)
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// True when `other` would be merged into this line instead of stored separately.
    pub fn same_selection(&self, product_id: &ProductId, attributes: &AttributeSet) -> bool {
        &self.product_id == product_id
            && self.attributes.canonical_key() == attributes.canonical_key()
    }
}

/// Order lifecycle status. Orders are created `Pending`; later transitions
/// belong to fulfilment systems outside this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Immutable snapshot of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub identity: CartIdentity,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub grand_total: Money,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub product_id: ProductId,
    pub product_name: String,
    pub attributes: AttributeSet,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SessionId;

    #[test]
    fn sellable_is_zero_for_inactive_records() {
        let mut record = InventoryRecord::new(VariantKey::product("SKU-1"), 7);
        assert_eq!(record.sellable(), 7);

        record.is_active = false;
        assert_eq!(record.sellable(), 0);
    }

    #[test]
    fn line_variant_follows_size_attribute() {
        let attributes = AttributeSet::from_pairs([("size", "M"), ("color", "red")]).unwrap();
        let line = CartLineRecord::new(
            CartIdentity::Guest(SessionId::new("s")),
            ProductId::new("TEE"),
            2,
            Money::new(150_000),
            attributes,
        );

        assert_eq!(line.variant(), VariantKey::new("TEE", Some("M".to_string())));
        assert_eq!(line.line_total(), Money::new(300_000));
    }

    #[test]
    fn same_selection_uses_canonical_attributes() {
        let line = CartLineRecord::new(
            CartIdentity::Guest(SessionId::new("s")),
            ProductId::new("TEE"),
            1,
            Money::new(100),
            AttributeSet::from_pairs([("size", "M"), ("color", "red")]).unwrap(),
        );
        let reordered = AttributeSet::from_pairs([("COLOR", "red"), ("size", "M")]).unwrap();

        assert!(line.same_selection(&ProductId::new("TEE"), &reordered));
        assert!(!line.same_selection(&ProductId::new("TEE"), &AttributeSet::new()));
    }

    #[test]
    fn discount_type_parse_matches_as_str() {
        for ty in [
            DiscountType::Percentage,
            DiscountType::FixedAmount,
            DiscountType::FreeShipping,
        ] {
            assert_eq!(DiscountType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(DiscountType::parse("bogus"), None);
    }

    #[test]
    fn coupon_codes_normalize_to_upper_case() {
        assert_eq!(CouponRecord::normalize_code("  save10 "), "SAVE10");
    }
}
