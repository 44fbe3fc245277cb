use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{AttributeSet, CartIdentity, CartLineId, OrderId, ProductId, UserId, VariantKey};

use crate::{
    CartLineRecord, CouponQuery, CouponRecord, CouponRedemption, InventoryRecord, OrderRecord,
    ProductQuery, ProductRecord, Result,
};

/// How long a transaction waits for a row or cart lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point of a storage backend.
///
/// All reads and writes happen through a [`Transaction`]; the store itself only
/// hands them out.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        (**self).begin().await
    }
}

/// One unit of work against the store.
///
/// Locks taken through `lock_*` are held until [`Transaction::commit`] or
/// [`Transaction::rollback`]. Dropping an unfinished transaction rolls it back.
/// Any call after the transaction finished fails with
/// [`StoreError::TransactionClosed`](crate::StoreError::TransactionClosed).
#[async_trait]
pub trait Transaction: Send {
    // Catalog

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>>;

    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<ProductRecord>>;

    /// Inserts or replaces a product row.
    async fn save_product(&mut self, product: &ProductRecord) -> Result<()>;

    // Inventory

    /// Unlocked read of a stock record.
    async fn get_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>>;

    /// Takes the exclusive lock on a stock record and returns its current state.
    ///
    /// Fails with `Busy` when the lock cannot be acquired within the lock timeout.
    async fn lock_inventory(&mut self, variant: &VariantKey) -> Result<Option<InventoryRecord>>;

    /// Writes a new stock count. The record must exist.
    async fn update_stock(&mut self, variant: &VariantKey, stock_quantity: i64) -> Result<()>;

    /// Inserts or replaces a stock record.
    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()>;

    // Coupons

    async fn get_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>>;

    /// Takes the exclusive lock on a coupon row and returns its current state.
    async fn lock_coupon(&mut self, code: &str) -> Result<Option<CouponRecord>>;

    async fn find_coupons(&mut self, query: &CouponQuery) -> Result<Vec<CouponRecord>>;

    /// Inserts or replaces a coupon row.
    async fn save_coupon(&mut self, coupon: &CouponRecord) -> Result<()>;

    /// Sets only the active flag of a coupon, leaving usage counts untouched.
    /// Returns false when no such coupon exists.
    async fn deactivate_coupon(&mut self, code: &str) -> Result<bool>;

    /// Number of redemptions of `code` by a registered user.
    async fn count_redemptions(&mut self, code: &str, user_id: UserId) -> Result<i64>;

    async fn insert_redemption(&mut self, redemption: &CouponRedemption) -> Result<()>;

    // Carts

    /// Serializes all cart mutations of `identity` for the rest of the transaction.
    async fn lock_cart(&mut self, identity: &CartIdentity) -> Result<()>;

    /// Lines owned by `identity`, oldest first.
    async fn cart_lines(&mut self, identity: &CartIdentity) -> Result<Vec<CartLineRecord>>;

    async fn get_cart_line(&mut self, id: CartLineId) -> Result<Option<CartLineRecord>>;

    /// The line of `identity` for this product and attribute combination, if any.
    async fn find_cart_line(
        &mut self,
        identity: &CartIdentity,
        product_id: &ProductId,
        attributes: &AttributeSet,
    ) -> Result<Option<CartLineRecord>>;

    /// Inserts or updates a line by id. Fails with `Duplicate` when another line
    /// of the same identity already holds the product/attribute combination.
    async fn save_cart_line(&mut self, line: &CartLineRecord) -> Result<()>;

    /// Returns false when no line with that id existed.
    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool>;

    /// Deletes every line of `identity`, returning how many were removed.
    async fn clear_cart(&mut self, identity: &CartIdentity) -> Result<u64>;

    /// Deletes the listed lines still owned by `identity`, returning how many
    /// were removed.
    async fn remove_cart_lines(
        &mut self,
        identity: &CartIdentity,
        ids: &[CartLineId],
    ) -> Result<u64>;

    /// Identities that currently own at least one line.
    async fn cart_identities(&mut self) -> Result<Vec<CartIdentity>>;

    // Orders

    /// Inserts an order header and its lines as one unit.
    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    // Completion

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
