use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{AttributeSet, CartIdentity, CartLineId, OrderId, ProductId, UserId, VariantKey};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CartLineRecord, CouponQuery, CouponRecord, CouponRedemption, InventoryRecord, OrderRecord,
    ProductQuery, ProductRecord, Result, StoreError,
    store::{DEFAULT_LOCK_TIMEOUT, Store, Transaction},
};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, ProductRecord>,
    inventory: HashMap<VariantKey, InventoryRecord>,
    coupons: HashMap<String, CouponRecord>,
    redemptions: Vec<CouponRedemption>,
    cart_lines: HashMap<CartLineId, CartLineRecord>,
    orders: HashMap<OrderId, OrderRecord>,
}

/// Writes buffered by a transaction until commit.
#[derive(Debug, Default)]
struct Staged {
    products: HashMap<ProductId, ProductRecord>,
    inventory: HashMap<VariantKey, InventoryRecord>,
    coupons: HashMap<String, CouponRecord>,
    /// Codes switched inactive without rewriting the rest of the row.
    deactivated_coupons: HashSet<String>,
    redemptions: Vec<CouponRedemption>,
    /// `None` marks a deleted line.
    cart_lines: HashMap<CartLineId, Option<CartLineRecord>>,
    orders: Vec<OrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Inventory(VariantKey),
    Coupon(String),
    Cart(CartIdentity),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Inventory(variant) => write!(f, "inventory {variant}"),
            LockKey::Coupon(code) => write!(f, "coupon {code}"),
            LockKey::Cart(identity) => write!(f, "cart {identity}"),
        }
    }
}

struct Inner {
    tables: RwLock<Tables>,
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
    fail_order_inserts: AtomicBool,
    fail_cart_clears: AtomicBool,
}

impl Inner {
    async fn apply(&self, staged: Staged) -> Result<()> {
        let mut tables = self.tables.write().await;

        for order in &staged.orders {
            if tables.orders.contains_key(&order.id)
                || tables
                    .orders
                    .values()
                    .any(|existing| existing.order_number == order.order_number)
            {
                return Err(StoreError::Duplicate(format!("order {}", order.order_number)));
            }
        }

        tables.products.extend(staged.products);
        tables.inventory.extend(staged.inventory);
        tables.coupons.extend(staged.coupons);
        for code in &staged.deactivated_coupons {
            if let Some(coupon) = tables.coupons.get_mut(code) {
                coupon.is_active = false;
            }
        }
        tables.redemptions.extend(staged.redemptions);
        for (id, line) in staged.cart_lines {
            match line {
                Some(line) => {
                    tables.cart_lines.insert(id, line);
                }
                None => {
                    tables.cart_lines.remove(&id);
                }
            }
        }
        for order in staged.orders {
            tables.orders.insert(order.id, order);
        }
        Ok(())
    }
}

/// In-memory store for tests and the demo server.
///
/// Writes are staged inside each transaction and applied atomically on commit.
/// Locks are per-key async mutexes held by the transaction, so two checkouts
/// touching the same stock record serialize exactly as they would on
/// PostgreSQL row locks.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose transactions give up waiting for a lock after `timeout`.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                lock_timeout: timeout,
                fail_order_inserts: AtomicBool::new(false),
                fail_cart_clears: AtomicBool::new(false),
            }),
        }
    }

    /// Makes every subsequent `insert_order` fail with `Unavailable`.
    pub fn set_fail_order_inserts(&self, fail: bool) {
        self.inner.fail_order_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `clear_cart` and `remove_cart_lines` fail with
    /// `Unavailable`.
    pub fn set_fail_cart_clears(&self, fail: bool) {
        self.inner.fail_cart_clears.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.inner.tables.read().await.orders.len()
    }

    /// Returns the committed stock count of a variant.
    pub async fn stock(&self, variant: &VariantKey) -> Option<i64> {
        self.inner
            .tables
            .read()
            .await
            .inventory
            .get(variant)
            .map(|record| record.stock_quantity)
    }

    /// Starts a transaction with the concrete type, for callers that do not
    /// need dynamic dispatch.
    pub fn transaction(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            guards: Vec::new(),
            held: HashSet::new(),
            staged: Staged::default(),
            finished: false,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(self.transaction()))
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    held: HashSet<LockKey>,
    staged: Staged,
    finished: bool,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.release_locks();
        }
    }
}

/// Committed lines not shadowed by the transaction, followed by staged ones.
fn visible_lines<'a>(
    staged: &'a Staged,
    tables: &'a Tables,
) -> impl Iterator<Item = &'a CartLineRecord> + 'a {
    tables
        .cart_lines
        .values()
        .filter(|line| !staged.cart_lines.contains_key(&line.id))
        .chain(staged.cart_lines.values().flatten())
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            Err(StoreError::TransactionClosed)
        } else {
            Ok(())
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.staged = Staged::default();
        self.release_locks();
    }

    /// Drops held guards and forgets lock entries nobody holds or waits on.
    fn release_locks(&mut self) {
        self.held.clear();
        self.guards.clear();
        // A contended map is pruned by the next releasing transaction.
        if let Ok(mut locks) = self.inner.locks.try_lock() {
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        }
    }

    async fn acquire(&mut self, key: LockKey) -> Result<()> {
        if self.held.contains(&key) {
            return Ok(());
        }

        let mutex = {
            let mut locks = self.inner.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        match tokio::time::timeout(self.inner.lock_timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                self.guards.push(guard);
                self.held.insert(key);
                Ok(())
            }
            Err(_) => {
                tracing::warn!(resource = %key, "lock wait timed out");
                metrics::counter!("store_lock_timeouts_total", "backend" => "memory").increment(1);
                Err(StoreError::Busy {
                    resource: key.to_string(),
                })
            }
        }
    }

    async fn read_inventory(&self, variant: &VariantKey) -> Option<InventoryRecord> {
        if let Some(record) = self.staged.inventory.get(variant) {
            return Some(record.clone());
        }
        self.inner.tables.read().await.inventory.get(variant).cloned()
    }

    async fn read_coupon(&self, code: &str) -> Option<CouponRecord> {
        let mut coupon = match self.staged.coupons.get(code) {
            Some(coupon) => coupon.clone(),
            None => self.inner.tables.read().await.coupons.get(code).cloned()?,
        };
        if self.staged.deactivated_coupons.contains(code) {
            coupon.is_active = false;
        }
        Some(coupon)
    }

    async fn owned_line_ids(&self, identity: &CartIdentity, ids: &[CartLineId]) -> Vec<CartLineId> {
        let tables = self.inner.tables.read().await;
        visible_lines(&self.staged, &tables)
            .filter(|line| &line.identity == identity && ids.contains(&line.id))
            .map(|line| line.id)
            .collect()
    }

    async fn read_cart_line(&self, id: CartLineId) -> Option<CartLineRecord> {
        if let Some(staged) = self.staged.cart_lines.get(&id) {
            return staged.clone();
        }
        self.inner.tables.read().await.cart_lines.get(&id).cloned()
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>> {
        self.ensure_open()?;
        if let Some(product) = self.staged.products.get(id) {
            return Ok(Some(product.clone()));
        }
        Ok(self.inner.tables.read().await.products.get(id).cloned())
    }

    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<ProductRecord>> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut merged: HashMap<&ProductId, &ProductRecord> = tables.products.iter().collect();
        merged.extend(self.staged.products.iter());

        let mut products: Vec<ProductRecord> = merged
            .into_values()
            .filter(|product| query.matches(product))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(products
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn save_product(&mut self, product: &ProductRecord) -> Result<()> {
        self.ensure_open()?;
        if product.price.is_negative() {
            return Err(StoreError::ConstraintViolation(format!(
                "negative price for product {}",
                product.id
            )));
        }
        self.staged
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn get_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>> {
        self.ensure_open()?;
        Ok(self.read_inventory(variant).await)
    }

    async fn lock_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>> {
        self.ensure_open()?;
        self.acquire(LockKey::Inventory(variant.clone())).await?;
        Ok(self.read_inventory(variant).await)
    }

    async fn update_stock(&mut self, variant: &VariantKey, stock_quantity: i64) -> Result<()> {
        self.ensure_open()?;
        if stock_quantity < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "negative stock for {variant}"
            )));
        }
        let mut record = self
            .read_inventory(variant)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("inventory {variant}")))?;
        record.stock_quantity = stock_quantity;
        self.staged.inventory.insert(variant.clone(), record);
        Ok(())
    }

    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        self.ensure_open()?;
        if record.stock_quantity < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "negative stock for {}",
                record.variant
            )));
        }
        self.staged
            .inventory
            .insert(record.variant.clone(), record.clone());
        Ok(())
    }

    async fn get_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>> {
        self.ensure_open()?;
        Ok(self.read_coupon(code).await)
    }

    async fn lock_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>> {
        self.ensure_open()?;
        self.acquire(LockKey::Coupon(code.to_string())).await?;
        Ok(self.read_coupon(code).await)
    }

    async fn find_coupons(&mut self, query: &CouponQuery) -> Result<Vec<CouponRecord>> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;

        let mut merged: HashMap<&String, &CouponRecord> = tables.coupons.iter().collect();
        merged.extend(self.staged.coupons.iter());

        let mut coupons: Vec<CouponRecord> = merged
            .into_values()
            .filter(|coupon| query.matches(coupon))
            .cloned()
            .collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        if let Some(limit) = query.limit {
            coupons.truncate(limit);
        }
        Ok(coupons)
    }

    async fn save_coupon(&mut self, coupon: &CouponRecord) -> Result<()> {
        self.ensure_open()?;
        if let Some(limit) = coupon.usage_limit_total
            && coupon.used_count > limit
        {
            return Err(StoreError::ConstraintViolation(format!(
                "coupon {} used {} times, limit {limit}",
                coupon.code, coupon.used_count
            )));
        }
        self.staged
            .coupons
            .insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn deactivate_coupon(&mut self, code: &str) -> Result<bool> {
        self.ensure_open()?;
        if self.read_coupon(code).await.is_none() {
            return Ok(false);
        }
        match self.staged.coupons.get_mut(code) {
            Some(coupon) => coupon.is_active = false,
            None => {
                self.staged.deactivated_coupons.insert(code.to_string());
            }
        }
        Ok(true)
    }

    async fn count_redemptions(&mut self, code: &str, user_id: UserId) -> Result<i64> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;
        let count = tables
            .redemptions
            .iter()
            .chain(self.staged.redemptions.iter())
            .filter(|r| r.coupon_code == code && r.user_id == Some(user_id))
            .count();
        Ok(count as i64)
    }

    async fn insert_redemption(&mut self, redemption: &CouponRedemption) -> Result<()> {
        self.ensure_open()?;
        self.staged.redemptions.push(redemption.clone());
        Ok(())
    }

    async fn lock_cart(&mut self, identity: &CartIdentity) -> Result<()> {
        self.ensure_open()?;
        self.acquire(LockKey::Cart(identity.clone())).await
    }

    async fn cart_lines(&mut self, identity: &CartIdentity) -> Result<Vec<CartLineRecord>> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;
        let mut lines: Vec<CartLineRecord> = visible_lines(&self.staged, &tables)
            .filter(|line| &line.identity == identity)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(lines)
    }

    async fn get_cart_line(&mut self, id: CartLineId) -> Result<Option<CartLineRecord>> {
        self.ensure_open()?;
        Ok(self.read_cart_line(id).await)
    }

    async fn find_cart_line(
        &mut self,
        identity: &CartIdentity,
        product_id: &ProductId,
        attributes: &AttributeSet,
    ) -> Result<Option<CartLineRecord>> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;
        Ok(visible_lines(&self.staged, &tables)
            .find(|line| &line.identity == identity && line.same_selection(product_id, attributes))
            .cloned())
    }

    async fn save_cart_line(&mut self, line: &CartLineRecord) -> Result<()> {
        self.ensure_open()?;
        if line.quantity == 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "cart line {} has zero quantity",
                line.id
            )));
        }

        let clash = {
            let tables = self.inner.tables.read().await;
            visible_lines(&self.staged, &tables).any(|other| {
                other.id != line.id
                    && other.identity == line.identity
                    && other.same_selection(&line.product_id, &line.attributes)
            })
        };
        if clash {
            return Err(StoreError::Duplicate(format!(
                "cart line for {} in cart {}",
                line.product_id, line.identity
            )));
        }

        self.staged.cart_lines.insert(line.id, Some(line.clone()));
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool> {
        self.ensure_open()?;
        let existed = self.read_cart_line(id).await.is_some();
        if existed {
            self.staged.cart_lines.insert(id, None);
        }
        Ok(existed)
    }

    async fn clear_cart(&mut self, identity: &CartIdentity) -> Result<u64> {
        self.ensure_open()?;
        if self.inner.fail_cart_clears.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("clear of cart {identity}")));
        }

        let ids: Vec<CartLineId> = {
            let tables = self.inner.tables.read().await;
            visible_lines(&self.staged, &tables)
                .filter(|line| &line.identity == identity)
                .map(|line| line.id)
                .collect()
        };
        for id in &ids {
            self.staged.cart_lines.insert(*id, None);
        }
        Ok(ids.len() as u64)
    }

    async fn remove_cart_lines(
        &mut self,
        identity: &CartIdentity,
        ids: &[CartLineId],
    ) -> Result<u64> {
        self.ensure_open()?;
        if self.inner.fail_cart_clears.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("clear of cart {identity}")));
        }

        let owned = self.owned_line_ids(identity, ids).await;
        for id in &owned {
            self.staged.cart_lines.insert(*id, None);
        }
        Ok(owned.len() as u64)
    }

    async fn cart_identities(&mut self) -> Result<Vec<CartIdentity>> {
        self.ensure_open()?;
        let tables = self.inner.tables.read().await;
        let identities: BTreeSet<CartIdentity> = visible_lines(&self.staged, &tables)
            .map(|line| line.identity.clone())
            .collect();
        Ok(identities.into_iter().collect())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        self.ensure_open()?;
        if self.inner.fail_order_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "insert of order {}",
                order.order_number
            )));
        }

        let duplicate = {
            let tables = self.inner.tables.read().await;
            tables
                .orders
                .values()
                .chain(self.staged.orders.iter())
                .any(|existing| {
                    existing.id == order.id || existing.order_number == order.order_number
                })
        };
        if duplicate {
            return Err(StoreError::Duplicate(format!("order {}", order.order_number)));
        }

        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        self.ensure_open()?;
        if let Some(order) = self.staged.orders.iter().find(|o| o.id == id) {
            return Ok(Some(order.clone()));
        }
        Ok(self.inner.tables.read().await.orders.get(&id).cloned())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut self.staged);
        let result = self.inner.apply(staged).await;
        self.finish();
        result
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, SessionId};

    use super::*;

    fn guest(session: &str) -> CartIdentity {
        CartIdentity::Guest(SessionId::new(session))
    }

    async fn seeded(stock: i64) -> InMemoryStore {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
        let mut tx = store.transaction();
        tx.save_inventory(&InventoryRecord::new(VariantKey::product("MUG"), stock))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = seeded(5).await;
        let variant = VariantKey::product("MUG");

        let mut tx = store.transaction();
        tx.update_stock(&variant, 3).await.unwrap();
        assert_eq!(
            tx.get_inventory(&variant).await.unwrap().unwrap().stock_quantity,
            3
        );
        assert_eq!(store.stock(&variant).await, Some(5));

        tx.commit().await.unwrap();
        assert_eq!(store.stock(&variant).await, Some(3));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = seeded(5).await;
        let variant = VariantKey::product("MUG");

        let mut tx = store.transaction();
        tx.update_stock(&variant, 0).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.stock(&variant).await, Some(5));
    }

    #[tokio::test]
    async fn dropping_transaction_discards_writes_and_releases_locks() {
        let store = seeded(5).await;
        let variant = VariantKey::product("MUG");

        {
            let mut tx = store.transaction();
            tx.lock_inventory(&variant).await.unwrap();
            tx.update_stock(&variant, 1).await.unwrap();
        }

        let mut tx = store.transaction();
        let record = tx.lock_inventory(&variant).await.unwrap().unwrap();
        assert_eq!(record.stock_quantity, 5);
    }

    #[tokio::test]
    async fn contended_lock_times_out_as_busy() {
        let store = seeded(5).await;
        let variant = VariantKey::product("MUG");

        let mut holder = store.transaction();
        holder.lock_inventory(&variant).await.unwrap();

        let mut waiter = store.transaction();
        let err = waiter.lock_inventory(&variant).await.unwrap_err();
        assert!(matches!(err, StoreError::Busy { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn relocking_same_key_is_reentrant() {
        let store = seeded(5).await;
        let mut tx = store.transaction();
        let identity = guest("s1");

        tx.lock_cart(&identity).await.unwrap();
        tx.lock_cart(&identity).await.unwrap();
    }

    #[tokio::test]
    async fn negative_stock_is_rejected() {
        let store = seeded(1).await;
        let mut tx = store.transaction();

        let err = tx
            .update_stock(&VariantKey::product("MUG"), -1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_selection_in_one_cart_is_rejected() {
        let store = InMemoryStore::new();
        let identity = guest("s1");
        let mut tx = store.transaction();

        let first = CartLineRecord::new(
            identity.clone(),
            ProductId::new("MUG"),
            1,
            Money::new(10),
            AttributeSet::new(),
        );
        let second = CartLineRecord::new(
            identity,
            ProductId::new("MUG"),
            2,
            Money::new(10),
            AttributeSet::new(),
        );

        tx.save_cart_line(&first).await.unwrap();
        let err = tx.save_cart_line(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn clear_cart_only_touches_owner() {
        let store = InMemoryStore::new();
        let mut tx = store.transaction();
        for session in ["a", "a", "b"] {
            let line = CartLineRecord::new(
                guest(session),
                ProductId::new(format!("P-{}", CartLineId::new())),
                1,
                Money::new(10),
                AttributeSet::new(),
            );
            tx.save_cart_line(&line).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.transaction();
        assert_eq!(tx.clear_cart(&guest("a")).await.unwrap(), 2);
        tx.commit().await.unwrap();

        let mut tx = store.transaction();
        assert!(tx.cart_lines(&guest("a")).await.unwrap().is_empty());
        assert_eq!(tx.cart_lines(&guest("b")).await.unwrap().len(), 1);
        assert_eq!(tx.cart_identities().await.unwrap(), vec![guest("b")]);
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let store = seeded(5).await;
        let variant = VariantKey::product("MUG");

        let mut tx = store.transaction();
        tx.lock_inventory(&variant).await.unwrap();
        tx.lock_cart(&guest("s1")).await.unwrap();
        assert_eq!(store.inner.locks.lock().await.len(), 2);
        tx.commit().await.unwrap();
        assert!(store.inner.locks.lock().await.is_empty());

        {
            let mut dropped = store.transaction();
            dropped.lock_cart(&guest("s2")).await.unwrap();
        }
        assert!(store.inner.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn held_lock_survives_another_release() {
        let store = seeded(5).await;

        let mut holder = store.transaction();
        holder.lock_cart(&guest("held")).await.unwrap();

        let mut other = store.transaction();
        other.lock_cart(&guest("other")).await.unwrap();
        other.rollback().await.unwrap();

        let locks = store.inner.locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&LockKey::Cart(guest("held"))));
    }

    #[tokio::test]
    async fn remove_cart_lines_only_deletes_listed_owned_lines() {
        let store = InMemoryStore::new();
        let mut tx = store.transaction();
        let mut ids = Vec::new();
        for session in ["a", "a", "b"] {
            let line = CartLineRecord::new(
                guest(session),
                ProductId::new(format!("P-{}", CartLineId::new())),
                1,
                Money::new(10),
                AttributeSet::new(),
            );
            tx.save_cart_line(&line).await.unwrap();
            ids.push(line.id);
        }
        tx.commit().await.unwrap();

        let mut tx = store.transaction();
        let removed = tx
            .remove_cart_lines(&guest("a"), &[ids[0], ids[2]])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        tx.commit().await.unwrap();

        let mut tx = store.transaction();
        let left: Vec<CartLineId> = tx
            .cart_lines(&guest("a"))
            .await
            .unwrap()
            .iter()
            .map(|line| line.id)
            .collect();
        assert_eq!(left, vec![ids[1]]);
        assert_eq!(tx.cart_lines(&guest("b")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivation_commits_over_a_newer_usage_count() {
        let store = InMemoryStore::new();
        let now = chrono::Utc::now();
        let coupon = CouponRecord {
            code: "ONE".to_string(),
            discount_type: crate::DiscountType::FixedAmount,
            value: 1_000,
            min_order_amount: Money::zero(),
            max_discount_amount: None,
            valid_from: now,
            valid_until: now,
            usage_limit_total: Some(1),
            usage_limit_per_customer: None,
            used_count: 0,
            is_active: true,
        };
        let mut tx = store.transaction();
        tx.save_coupon(&coupon).await.unwrap();
        tx.commit().await.unwrap();

        let mut deactivating = store.transaction();
        assert!(deactivating.deactivate_coupon("ONE").await.unwrap());
        assert!(!deactivating.get_coupon("ONE").await.unwrap().unwrap().is_active);

        let mut redeeming = store.transaction();
        let mut locked = redeeming.lock_coupon("ONE").await.unwrap().unwrap();
        locked.used_count = 1;
        redeeming.save_coupon(&locked).await.unwrap();
        redeeming.commit().await.unwrap();
        deactivating.commit().await.unwrap();

        let mut tx = store.transaction();
        let stored = tx.get_coupon("ONE").await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
        assert!(!stored.is_active);
        assert!(!tx.deactivate_coupon("MISSING").await.unwrap());
    }

    #[tokio::test]
    async fn injected_faults_fail_writes() {
        let store = InMemoryStore::new();
        store.set_fail_cart_clears(true);

        let mut tx = store.transaction();
        let err = tx.clear_cart(&guest("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn finished_transaction_rejects_calls() {
        let store = InMemoryStore::new();
        let mut tx = store.transaction();
        tx.commit().await.unwrap();

        let err = tx.get_product(&ProductId::new("X")).await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionClosed));
    }

    #[tokio::test]
    async fn coupon_usage_above_limit_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.transaction();
        let now = chrono::Utc::now();
        let coupon = CouponRecord {
            code: "ONCE".to_string(),
            discount_type: crate::DiscountType::FixedAmount,
            value: 1_000,
            min_order_amount: Money::zero(),
            max_discount_amount: None,
            valid_from: now,
            valid_until: now,
            usage_limit_total: Some(1),
            usage_limit_per_customer: None,
            used_count: 2,
            is_active: true,
        };

        let err = tx.save_coupon(&coupon).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }
}
