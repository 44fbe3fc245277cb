use std::time::Duration;

use async_trait::async_trait;
use common::{
    AttributeSet, CartIdentity, CartLineId, Money, OrderId, ProductId, UserId, VariantKey,
};
use sqlx::{
    PgConnection, PgPool, Postgres, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    CartLineRecord, CouponQuery, CouponRecord, CouponRedemption, DiscountType, InventoryRecord,
    OrderLineRecord, OrderRecord, OrderStatus, ProductQuery, ProductRecord, Result, StoreError,
    store::{DEFAULT_LOCK_TIMEOUT, Store, Transaction},
};

const PRODUCT_COLUMNS: &str = "id, name, category, price, is_active";
const INVENTORY_COLUMNS: &str = "product_id, size, stock_quantity, is_active";
const COUPON_COLUMNS: &str = "code, discount_type, value, min_order_amount, max_discount_amount, \
     valid_from, valid_until, usage_limit_total, usage_limit_per_customer, used_count, is_active";
const CART_LINE_COLUMNS: &str = "id, identity_kind, identity_id, product_id, quantity, unit_price, \
     attributes, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Sets how long each transaction waits for a row or advisory lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Starts a transaction with the concrete type.
    pub async fn transaction(&self) -> Result<PgTransaction> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(PgTransaction { tx: Some(tx) })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(self.transaction().await?))
    }
}

/// Transaction over a [`PgStore`]. Dropping it without commit rolls back.
pub struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

/// Maps lock, serialization and constraint failures onto store errors.
fn classify(err: sqlx::Error, resource: &str) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some("55P03" | "40P01" | "40001") => {
            tracing::warn!(resource, "lock wait timed out");
            metrics::counter!("store_lock_timeouts_total", "backend" => "postgres").increment(1);
            StoreError::Busy {
                resource: resource.to_string(),
            }
        }
        Some("23505") => StoreError::Duplicate(resource.to_string()),
        Some("23514") => StoreError::ConstraintViolation(resource.to_string()),
        _ => StoreError::Database(err),
    }
}

fn row_to_product(row: &PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price: Money::new(row.try_get("price")?),
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_inventory(row: &PgRow) -> Result<InventoryRecord> {
    let size: String = row.try_get("size")?;
    Ok(InventoryRecord {
        variant: VariantKey::new(
            row.try_get::<String, _>("product_id")?,
            (!size.is_empty()).then_some(size),
        ),
        stock_quantity: row.try_get("stock_quantity")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_coupon(row: &PgRow) -> Result<CouponRecord> {
    let discount_type: String = row.try_get("discount_type")?;
    let discount_type = DiscountType::parse(&discount_type)
        .ok_or_else(|| StoreError::CorruptRow(format!("discount type {discount_type}")))?;

    Ok(CouponRecord {
        code: row.try_get("code")?,
        discount_type,
        value: row.try_get("value")?,
        min_order_amount: Money::new(row.try_get("min_order_amount")?),
        max_discount_amount: row
            .try_get::<Option<i64>, _>("max_discount_amount")?
            .map(Money::new),
        valid_from: row.try_get("valid_from")?,
        valid_until: row.try_get("valid_until")?,
        usage_limit_total: row.try_get("usage_limit_total")?,
        usage_limit_per_customer: row.try_get("usage_limit_per_customer")?,
        used_count: row.try_get("used_count")?,
        is_active: row.try_get("is_active")?,
    })
}

fn identity_from_row(row: &PgRow) -> Result<CartIdentity> {
    let kind: String = row.try_get("identity_kind")?;
    let key: String = row.try_get("identity_id")?;
    CartIdentity::from_parts(&kind, &key)
        .ok_or_else(|| StoreError::CorruptRow(format!("cart identity {kind}:{key}")))
}

fn quantity_from_row(row: &PgRow) -> Result<u32> {
    let quantity: i32 = row.try_get("quantity")?;
    u32::try_from(quantity).map_err(|_| StoreError::CorruptRow(format!("quantity {quantity}")))
}

fn row_to_cart_line(row: &PgRow) -> Result<CartLineRecord> {
    let attributes: serde_json::Value = row.try_get("attributes")?;
    Ok(CartLineRecord {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        identity: identity_from_row(row)?,
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: quantity_from_row(row)?,
        unit_price: Money::new(row.try_get("unit_price")?),
        attributes: serde_json::from_value::<AttributeSet>(attributes)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLineRecord> {
    let attributes: serde_json::Value = row.try_get("attributes")?;
    Ok(OrderLineRecord {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        attributes: serde_json::from_value(attributes)?,
        quantity: quantity_from_row(row)?,
        unit_price: Money::new(row.try_get("unit_price")?),
        line_total: Money::new(row.try_get("line_total")?),
    })
}

fn quantity_param(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::ConstraintViolation(format!("quantity {quantity} out of range")))
}

impl PgTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }

    async fn fetch_inventory(
        &mut self,
        variant: &VariantKey,
        for_update: bool,
    ) -> Result<Option<InventoryRecord>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1 AND size = $2{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let resource = format!("inventory {variant}");
        let row = sqlx::query(&sql)
            .bind(variant.product_id.as_str())
            .bind(variant.size_column())
            .fetch_optional(self.conn()?)
            .await
            .map_err(|e| classify(e, &resource))?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn fetch_coupon(&mut self, code: &str, for_update: bool) -> Result<Option<CouponRecord>> {
        let sql = format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let resource = format!("coupon {code}");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(self.conn()?)
            .await
            .map_err(|e| classify(e, &resource))?;
        row.as_ref().map(row_to_coupon).transpose()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn get_product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<ProductRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));

        if let Some(category) = &query.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(min) = query.min_price {
            builder.push(" AND price >= ").push_bind(min.amount());
        }
        if let Some(max) = query.max_price {
            builder.push(" AND price <= ").push_bind(max.amount());
        }
        if let Some(active) = query.active {
            builder.push(" AND is_active = ").push_bind(active);
        }
        builder.push(" ORDER BY id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = builder.build().fetch_all(self.conn()?).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn save_product(&mut self, product: &ProductRecord) -> Result<()> {
        let resource = format!("product {}", product.id);
        sqlx::query(
            r#"
            INSERT INTO products (id, name, category, price, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                price = EXCLUDED.price,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price.amount())
        .bind(product.is_active)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn get_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>> {
        self.fetch_inventory(variant, false).await
    }

    async fn lock_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>> {
        self.fetch_inventory(variant, true).await
    }

    async fn update_stock(&mut self, variant: &VariantKey, stock_quantity: i64) -> Result<()> {
        let resource = format!("inventory {variant}");
        let result = sqlx::query(
            "UPDATE inventory SET stock_quantity = $3, updated_at = NOW() \
             WHERE product_id = $1 AND size = $2",
        )
        .bind(variant.product_id.as_str())
        .bind(variant.size_column())
        .bind(stock_quantity)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(resource));
        }
        Ok(())
    }

    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        let resource = format!("inventory {}", record.variant);
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, size, stock_quantity, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, size) DO UPDATE SET
                stock_quantity = EXCLUDED.stock_quantity,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(record.variant.product_id.as_str())
        .bind(record.variant.size_column())
        .bind(record.stock_quantity)
        .bind(record.is_active)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn get_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>> {
        self.fetch_coupon(code, false).await
    }

    async fn lock_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>> {
        self.fetch_coupon(code, true).await
    }

    async fn find_coupons(&mut self, query: &CouponQuery) -> Result<Vec<CouponRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE TRUE"));

        if let Some(active) = query.active {
            builder.push(" AND is_active = ").push_bind(active);
        }
        if let Some(at) = query.valid_at {
            builder.push(" AND valid_from <= ").push_bind(at);
            builder.push(" AND valid_until >= ").push_bind(at);
        }
        if let Some(at) = query.expired_before {
            builder.push(" AND valid_until < ").push_bind(at);
        }
        if let Some(discount_type) = query.discount_type {
            builder
                .push(" AND discount_type = ")
                .push_bind(discount_type.as_str());
        }
        builder.push(" ORDER BY code");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(self.conn()?).await?;
        rows.iter().map(row_to_coupon).collect()
    }

    async fn save_coupon(&mut self, coupon: &CouponRecord) -> Result<()> {
        let resource = format!("coupon {}", coupon.code);
        sqlx::query(
            r#"
            INSERT INTO coupons (code, discount_type, value, min_order_amount, max_discount_amount,
                                 valid_from, valid_until, usage_limit_total, usage_limit_per_customer,
                                 used_count, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = EXCLUDED.discount_type,
                value = EXCLUDED.value,
                min_order_amount = EXCLUDED.min_order_amount,
                max_discount_amount = EXCLUDED.max_discount_amount,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                usage_limit_total = EXCLUDED.usage_limit_total,
                usage_limit_per_customer = EXCLUDED.usage_limit_per_customer,
                used_count = EXCLUDED.used_count,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&coupon.code)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.value)
        .bind(coupon.min_order_amount.amount())
        .bind(coupon.max_discount_amount.map(|m| m.amount()))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit_total)
        .bind(coupon.usage_limit_per_customer)
        .bind(coupon.used_count)
        .bind(coupon.is_active)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn deactivate_coupon(&mut self, code: &str) -> Result<bool> {
        let resource = format!("coupon {code}");
        let result = sqlx::query("UPDATE coupons SET is_active = FALSE WHERE code = $1")
            .bind(code)
            .execute(self.conn()?)
            .await
            .map_err(|e| classify(e, &resource))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_redemptions(&mut self, code: &str, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_code = $1 AND user_id = $2",
        )
        .bind(code)
        .bind(user_id.as_uuid())
        .fetch_one(self.conn()?)
        .await?;
        Ok(count)
    }

    async fn insert_redemption(&mut self, redemption: &CouponRedemption) -> Result<()> {
        let resource = format!("redemption of {}", redemption.coupon_code);
        sqlx::query(
            "INSERT INTO coupon_redemptions (coupon_code, order_id, user_id, redeemed_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&redemption.coupon_code)
        .bind(redemption.order_id.as_uuid())
        .bind(redemption.user_id.map(|id| id.as_uuid()))
        .bind(redemption.redeemed_at)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn lock_cart(&mut self, identity: &CartIdentity) -> Result<()> {
        let resource = format!("cart {identity}");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(identity.to_string())
            .execute(self.conn()?)
            .await
            .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn cart_lines(&mut self, identity: &CartIdentity) -> Result<Vec<CartLineRecord>> {
        let sql = format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines \
             WHERE identity_kind = $1 AND identity_id = $2 ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(identity.kind())
            .bind(identity.key())
            .fetch_all(self.conn()?)
            .await?;
        rows.iter().map(row_to_cart_line).collect()
    }

    async fn get_cart_line(&mut self, id: CartLineId) -> Result<Option<CartLineRecord>> {
        let sql = format!("SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(row_to_cart_line).transpose()
    }

    async fn find_cart_line(
        &mut self,
        identity: &CartIdentity,
        product_id: &ProductId,
        attributes: &AttributeSet,
    ) -> Result<Option<CartLineRecord>> {
        let sql = format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines \
             WHERE identity_kind = $1 AND identity_id = $2 AND product_id = $3 AND attributes_key = $4"
        );
        let row = sqlx::query(&sql)
            .bind(identity.kind())
            .bind(identity.key())
            .bind(product_id.as_str())
            .bind(attributes.canonical_key())
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(row_to_cart_line).transpose()
    }

    async fn save_cart_line(&mut self, line: &CartLineRecord) -> Result<()> {
        let resource = format!("cart line for {} in cart {}", line.product_id, line.identity);
        sqlx::query(
            r#"
            INSERT INTO cart_lines (id, identity_kind, identity_id, product_id, quantity, unit_price,
                                    attributes, attributes_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                identity_kind = EXCLUDED.identity_kind,
                identity_id = EXCLUDED.identity_id,
                quantity = EXCLUDED.quantity,
                unit_price = EXCLUDED.unit_price,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.identity.kind())
        .bind(line.identity.key())
        .bind(line.product_id.as_str())
        .bind(quantity_param(line.quantity)?)
        .bind(line.unit_price.amount())
        .bind(serde_json::to_value(&line.attributes)?)
        .bind(line.attributes.canonical_key())
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(self.conn()?)
        .await
        .map_err(|e| classify(e, &resource))?;
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, identity: &CartIdentity) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM cart_lines WHERE identity_kind = $1 AND identity_id = $2")
                .bind(identity.kind())
                .bind(identity.key())
                .execute(self.conn()?)
                .await?;
        Ok(result.rows_affected())
    }

    async fn remove_cart_lines(
        &mut self,
        identity: &CartIdentity,
        ids: &[CartLineId],
    ) -> Result<u64> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let result = sqlx::query(
            "DELETE FROM cart_lines \
             WHERE identity_kind = $1 AND identity_id = $2 AND id = ANY($3)",
        )
        .bind(identity.kind())
        .bind(identity.key())
        .bind(ids)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected())
    }

    async fn cart_identities(&mut self) -> Result<Vec<CartIdentity>> {
        let rows = sqlx::query(
            "SELECT DISTINCT identity_kind, identity_id FROM cart_lines \
             ORDER BY identity_kind, identity_id",
        )
        .fetch_all(self.conn()?)
        .await?;
        rows.iter().map(identity_from_row).collect()
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        let resource = format!("order {}", order.order_number);
        let conn = self.conn()?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, identity_kind, identity_id, status,
                                subtotal, tax, shipping, discount, grand_total, currency,
                                coupon_code, shipping_address, payment_method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.identity.kind())
        .bind(order.identity.key())
        .bind(order.status.as_str())
        .bind(order.subtotal.amount())
        .bind(order.tax.amount())
        .bind(order.shipping.amount())
        .bind(order.discount.amount())
        .bind(order.grand_total.amount())
        .bind(&order.currency)
        .bind(order.coupon_code.as_deref())
        .bind(&order.shipping_address)
        .bind(&order.payment_method)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| classify(e, &resource))?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, product_name, attributes,
                                         quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.product_id.as_str())
            .bind(&line.product_name)
            .bind(serde_json::to_value(&line.attributes)?)
            .bind(quantity_param(line.quantity)?)
            .bind(line.unit_price.amount())
            .bind(line.line_total.amount())
            .execute(&mut *conn)
            .await
            .map_err(|e| classify(e, &resource))?;
        }

        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let conn = self.conn()?;

        let Some(row) = sqlx::query(
            r#"
            SELECT id, order_number, identity_kind, identity_id, status, subtotal, tax, shipping,
                   discount, grand_total, currency, coupon_code, shipping_address, payment_method,
                   created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            r#"
            SELECT product_id, product_name, attributes, quantity, unit_price, line_total
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let status: String = row.try_get("status")?;
        Ok(Some(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            identity: identity_from_row(&row)?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("order status {status}")))?,
            subtotal: Money::new(row.try_get("subtotal")?),
            tax: Money::new(row.try_get("tax")?),
            shipping: Money::new(row.try_get("shipping")?),
            discount: Money::new(row.try_get("discount")?),
            grand_total: Money::new(row.try_get("grand_total")?),
            currency: row.try_get("currency")?,
            coupon_code: row.try_get("coupon_code")?,
            shipping_address: row.try_get("shipping_address")?,
            payment_method: row.try_get("payment_method")?,
            created_at: row.try_get("created_at")?,
            lines: line_rows
                .iter()
                .map(row_to_order_line)
                .collect::<Result<Vec<_>>>()?,
        }))
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit()
            .await
            .map_err(|e| classify(e, "transaction commit"))
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
