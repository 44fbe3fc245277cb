//! Demo catalog for running the server without a database.

use chrono::{Duration, Utc};
use common::{Money, VariantKey};
use store::{CouponRecord, DiscountType, InventoryRecord, ProductRecord, Store};

/// Seeds a small catalog with stock and a few coupons.
pub async fn seed(store: &dyn Store) -> store::Result<()> {
    let mut tx = store.begin().await?;

    let products = [
        ("TEE-BASIC", "Basic T-Shirt", "apparel", 150_000),
        ("HOODIE", "Zip Hoodie", "apparel", 450_000),
        ("MUG", "Ceramic Mug", "home", 80_000),
        ("TOTE", "Canvas Tote", "accessories", 120_000),
    ];
    let product_count = products.len();
    for (id, name, category, price) in products {
        tx.save_product(&ProductRecord::new(id, name, category, Money::new(price)))
            .await?;
    }

    for product in ["TEE-BASIC", "HOODIE"] {
        for (size, stock) in [("S", 20), ("M", 30), ("L", 15)] {
            tx.save_inventory(&InventoryRecord::new(
                VariantKey::new(product, Some(size.to_string())),
                stock,
            ))
            .await?;
        }
    }
    tx.save_inventory(&InventoryRecord::new(VariantKey::product("MUG"), 50))
        .await?;
    tx.save_inventory(&InventoryRecord::new(VariantKey::product("TOTE"), 5))
        .await?;

    let now = Utc::now();
    let coupons = [
        ("SAVE10", DiscountType::Percentage, 10, 100_000, Some(50_000)),
        ("FLAT50K", DiscountType::FixedAmount, 50_000, 300_000, None),
        ("FREESHIP", DiscountType::FreeShipping, 0, 0, None),
    ];
    let coupon_count = coupons.len();
    for (code, discount_type, value, minimum, cap) in coupons {
        tx.save_coupon(&CouponRecord {
            code: code.to_string(),
            discount_type,
            value,
            min_order_amount: Money::new(minimum),
            max_discount_amount: cap.map(Money::new),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
            usage_limit_total: Some(1_000),
            usage_limit_per_customer: Some(1),
            used_count: 0,
            is_active: true,
        })
        .await?;
    }

    tx.commit().await?;
    tracing::info!(products = product_count, coupons = coupon_count, "demo catalog seeded");
    Ok(())
}
