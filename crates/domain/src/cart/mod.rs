//! Cart lines per identity.

mod view;

pub use view::{CartLineView, CartView, MergeReport, QuantityUpdate};

use chrono::Utc;
use common::{AttributeSet, CartIdentity, CartLineId, ProductId, SessionId, UserId, VariantKey};
use store::{CartLineRecord, Store, Transaction};

use crate::error::{CouponError, DomainError, Result};
use crate::inventory::InventoryLedger;
use crate::pricing::{AppliedCoupon, PricingEngine};
use crate::tx::settle;

fn validate_quantity(quantity: i64) -> Result<u32> {
    if quantity <= 0 {
        return Err(DomainError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| DomainError::Validation(format!("quantity {quantity} is too large")))
}

fn combined_quantity(current: u32, added: u32) -> Result<u32> {
    current
        .checked_add(added)
        .ok_or_else(|| DomainError::Validation("combined quantity is too large".to_string()))
}

fn record_mutation(op: &'static str) {
    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
}

/// Cart operations. Every mutation locks the owning identity's cart for its
/// transaction.
#[derive(Clone)]
pub struct CartStore<S: Store> {
    store: S,
    pricing: PricingEngine,
    inventory: InventoryLedger,
}

impl<S: Store> CartStore<S> {
    pub fn new(store: S, pricing: PricingEngine) -> Self {
        Self {
            store,
            pricing,
            inventory: InventoryLedger::new(),
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Adds `quantity` units of a product selection, merging with an existing
    /// line for the same product and attributes.
    ///
    /// A merged line is re-stamped with the current catalog price.
    #[tracing::instrument(
        skip(self, identity, product_id, attributes),
        fields(identity = %identity, product = %product_id)
    )]
    pub async fn add_item(
        &self,
        identity: &CartIdentity,
        product_id: &ProductId,
        quantity: i64,
        attributes: AttributeSet,
    ) -> Result<CartLineRecord> {
        let quantity = validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .add_item_in(tx.as_mut(), identity, product_id, quantity, attributes)
            .await;
        let line = settle(tx, result).await?;

        record_mutation("add");
        Ok(line)
    }

    async fn add_item_in(
        &self,
        tx: &mut dyn Transaction,
        identity: &CartIdentity,
        product_id: &ProductId,
        quantity: u32,
        attributes: AttributeSet,
    ) -> Result<CartLineRecord> {
        let product = tx
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", product_id))?;
        if !product.is_active {
            return Err(DomainError::ProductUnavailable(product_id.clone()));
        }

        tx.lock_cart(identity).await?;

        let existing = tx.find_cart_line(identity, product_id, &attributes).await?;
        let total = match &existing {
            Some(line) => combined_quantity(line.quantity, quantity)?,
            None => quantity,
        };

        let variant = VariantKey::for_selection(product_id, &attributes);
        let available = self.inventory.available(tx, &variant).await?;
        if available < i64::from(total) {
            return Err(DomainError::InsufficientStock {
                variant,
                available,
                requested: i64::from(total),
            });
        }

        let line = match existing {
            Some(mut line) => {
                line.quantity = total;
                line.unit_price = product.price;
                line.updated_at = Utc::now();
                line
            }
            None => CartLineRecord::new(
                identity.clone(),
                product_id.clone(),
                quantity,
                product.price,
                attributes,
            ),
        };
        tx.save_cart_line(&line).await?;
        Ok(line)
    }

    /// Sets a line's quantity; zero or less removes it.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn update_quantity(
        &self,
        identity: &CartIdentity,
        line_id: CartLineId,
        quantity: i64,
    ) -> Result<QuantityUpdate> {
        if quantity <= 0 {
            self.remove_item(identity, line_id).await?;
            return Ok(QuantityUpdate::Removed);
        }
        let quantity = validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_cart(identity).await?;
            let mut line = owned_line(tx.as_mut(), identity, line_id).await?;
            line.quantity = quantity;
            line.updated_at = Utc::now();
            tx.save_cart_line(&line).await?;
            Ok::<_, DomainError>(line)
        }
        .await;
        let line = settle(tx, result).await?;

        record_mutation("update");
        Ok(QuantityUpdate::Updated(line))
    }

    /// Deletes one line of `identity`. A line owned by anyone else is reported
    /// as not found.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn remove_item(&self, identity: &CartIdentity, line_id: CartLineId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_cart(identity).await?;
            owned_line(tx.as_mut(), identity, line_id).await?;
            tx.delete_cart_line(line_id).await?;
            Ok::<_, DomainError>(())
        }
        .await;
        settle(tx, result).await?;

        record_mutation("remove");
        Ok(())
    }

    /// Deletes every line of `identity`, returning how many were removed.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn clear(&self, identity: &CartIdentity) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_cart(identity).await?;
            Ok::<_, DomainError>(tx.clear_cart(identity).await?)
        }
        .await;
        let removed = settle(tx, result).await?;

        record_mutation("clear");
        Ok(removed)
    }

    /// Moves a guest session's cart into a user's cart in one transaction.
    ///
    /// Lines matching an existing user line by product and attributes are
    /// summed into it; the rest change owner. No guest line survives.
    #[tracing::instrument(skip(self, session_id, user_id), fields(session = %session_id, user = %user_id))]
    pub async fn transfer_guest_cart_to_user(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<MergeReport> {
        let guest = CartIdentity::Guest(session_id.clone());
        let user = CartIdentity::User(user_id);

        let mut tx = self.store.begin().await?;
        let result = merge_carts(tx.as_mut(), &guest, &user).await;
        let report = settle(tx, result).await?;

        record_mutation("merge");
        tracing::info!(moved = report.moved, merged = report.merged, "guest cart merged");
        Ok(report)
    }

    /// Lines of `identity` with the current status of each product.
    pub async fn lines(&self, identity: &CartIdentity) -> Result<Vec<CartLineView>> {
        let mut tx = self.store.begin().await?;
        let result = load_views(tx.as_mut(), identity).await;
        settle(tx, result).await
    }

    /// Lines plus their priced summary.
    pub async fn summary(&self, identity: &CartIdentity) -> Result<CartView> {
        let lines = self.lines(identity).await?;
        let summary = self.pricing.summarize(&lines);
        Ok(CartView { lines, summary })
    }

    /// Prices the cart with `code` applied, without redeeming the coupon.
    ///
    /// Coupon failures still commit, so an expired coupon stays deactivated.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn apply_coupon(&self, identity: &CartIdentity, code: &str) -> Result<AppliedCoupon> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let lines = load_views(tx.as_mut(), identity).await?;
            let summary = self.pricing.summarize(&lines);
            self.pricing
                .apply_coupon(tx.as_mut(), code, &summary, identity, false)
                .await
        }
        .await;

        match result {
            Err(DomainError::Coupon(err @ CouponError::Expired { .. })) => {
                tx.commit().await?;
                Err(DomainError::Coupon(err))
            }
            other => settle(tx, other).await,
        }
    }
}

/// Loads a line and checks that `identity` owns it.
async fn owned_line(
    tx: &mut dyn Transaction,
    identity: &CartIdentity,
    line_id: CartLineId,
) -> Result<CartLineRecord> {
    match tx.get_cart_line(line_id).await? {
        Some(line) if &line.identity == identity => Ok(line),
        _ => Err(DomainError::not_found("cart line", line_id)),
    }
}

pub(crate) async fn load_views(
    tx: &mut dyn Transaction,
    identity: &CartIdentity,
) -> Result<Vec<CartLineView>> {
    let lines = tx.cart_lines(identity).await?;
    let mut views = Vec::with_capacity(lines.len());
    for line in lines {
        let product = tx.get_product(&line.product_id).await?;
        views.push(CartLineView::from_product(line, product.as_ref()));
    }
    Ok(views)
}

async fn merge_carts(
    tx: &mut dyn Transaction,
    guest: &CartIdentity,
    user: &CartIdentity,
) -> Result<MergeReport> {
    let mut identities = [guest, user];
    identities.sort();
    for identity in identities {
        tx.lock_cart(identity).await?;
    }

    let mut report = MergeReport::default();
    let now = Utc::now();

    for mut guest_line in tx.cart_lines(guest).await? {
        match tx
            .find_cart_line(user, &guest_line.product_id, &guest_line.attributes)
            .await?
        {
            Some(mut user_line) => {
                user_line.quantity = combined_quantity(user_line.quantity, guest_line.quantity)?;
                user_line.updated_at = now;
                tx.delete_cart_line(guest_line.id).await?;
                tx.save_cart_line(&user_line).await?;
                report.merged += 1;
            }
            None => {
                guest_line.identity = user.clone();
                guest_line.updated_at = now;
                tx.save_cart_line(&guest_line).await?;
                report.moved += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use common::Money;
    use store::{InMemoryStore, InventoryRecord, ProductRecord};

    use super::*;

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (id, price) in [("A", 100_000), ("B", 50_000)] {
            tx.save_product(&ProductRecord::new(id, id, "test", Money::new(price)))
                .await
                .unwrap();
            tx.save_inventory(&InventoryRecord::new(VariantKey::product(id), 100))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    fn guest(session: &str) -> CartIdentity {
        CartIdentity::Guest(SessionId::new(session))
    }

    fn carts(store: &InMemoryStore) -> CartStore<InMemoryStore> {
        CartStore::new(store.clone(), PricingEngine::default())
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected_before_storage() {
        let store = InMemoryStore::new();
        let err = carts(&store)
            .add_item(&guest("s"), &ProductId::new("A"), 0, AttributeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn re_adding_increments_and_restamps_price() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        let product = ProductId::new("A");

        let first = carts
            .add_item(&identity, &product, 1, AttributeSet::new())
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.save_product(&ProductRecord::new("A", "A", "test", Money::new(120_000)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let second = carts
            .add_item(&identity, &product, 2, AttributeSet::new())
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity, 3);
        assert_eq!(second.unit_price, Money::new(120_000));
        assert_eq!(carts.lines(&identity).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_attributes_make_separate_lines() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        let product = ProductId::new("A");

        carts
            .add_item(&identity, &product, 1, AttributeSet::from_pairs([("color", "red")]).unwrap())
            .await
            .unwrap();
        carts
            .add_item(&identity, &product, 1, AttributeSet::from_pairs([("color", "blue")]).unwrap())
            .await
            .unwrap();

        assert_eq!(carts.lines(&identity).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn inactive_and_missing_products_cannot_be_added() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();
        let mut inactive = ProductRecord::new("B", "B", "test", Money::new(50_000));
        inactive.is_active = false;
        tx.save_product(&inactive).await.unwrap();
        tx.commit().await.unwrap();

        let carts = carts(&store);
        let err = carts
            .add_item(&guest("s"), &ProductId::new("B"), 1, AttributeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ProductUnavailable(_)));

        let err = carts
            .add_item(&guest("s"), &ProductId::new("ZZZ"), 1, AttributeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn adding_more_than_stock_fails() {
        let store = seeded_store().await;
        let err = carts(&store)
            .add_item(&guest("s"), &ProductId::new("A"), 101, AttributeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { available: 100, .. }));
    }

    #[tokio::test]
    async fn foreign_line_is_not_found_and_untouched() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let owner = guest("owner");
        let line = carts
            .add_item(&owner, &ProductId::new("A"), 2, AttributeSet::new())
            .await
            .unwrap();

        let err = carts
            .update_quantity(&guest("intruder"), line.id, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let err = carts
            .remove_item(&guest("intruder"), line.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let lines = carts.lines(&owner).await.unwrap();
        assert_eq!(lines[0].line.quantity, 2);
    }

    #[tokio::test]
    async fn zero_quantity_update_removes_line() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        let line = carts
            .add_item(&identity, &ProductId::new("A"), 2, AttributeSet::new())
            .await
            .unwrap();

        let outcome = carts.update_quantity(&identity, line.id, 0).await.unwrap();
        assert_eq!(outcome, QuantityUpdate::Removed);
        assert!(carts.lines(&identity).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_sets_quantity() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        let line = carts
            .add_item(&identity, &ProductId::new("A"), 2, AttributeSet::new())
            .await
            .unwrap();

        let outcome = carts.update_quantity(&identity, line.id, 7).await.unwrap();
        match outcome {
            QuantityUpdate::Updated(updated) => assert_eq!(updated.quantity, 7),
            QuantityUpdate::Removed => panic!("line should remain"),
        }
    }

    #[tokio::test]
    async fn merge_sums_matching_lines_and_moves_the_rest() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let session = SessionId::new("guest-1");
        let user_id = UserId::new();
        let user = CartIdentity::User(user_id);
        let guest = CartIdentity::Guest(session.clone());

        carts
            .add_item(&guest, &ProductId::new("A"), 2, AttributeSet::new())
            .await
            .unwrap();
        carts
            .add_item(&guest, &ProductId::new("B"), 1, AttributeSet::new())
            .await
            .unwrap();
        carts
            .add_item(&user, &ProductId::new("A"), 3, AttributeSet::new())
            .await
            .unwrap();

        let report = carts
            .transfer_guest_cart_to_user(&session, user_id)
            .await
            .unwrap();
        assert_eq!(report, MergeReport { moved: 1, merged: 1 });

        let mut quantities: Vec<(String, u32)> = carts
            .lines(&user)
            .await
            .unwrap()
            .into_iter()
            .map(|v| (v.line.product_id.to_string(), v.line.quantity))
            .collect();
        quantities.sort();
        assert_eq!(quantities, vec![("A".to_string(), 5), ("B".to_string(), 1)]);
        assert!(carts.lines(&guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_lists_inactive_lines_without_billing_them() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        carts
            .add_item(&identity, &ProductId::new("A"), 2, AttributeSet::new())
            .await
            .unwrap();
        carts
            .add_item(&identity, &ProductId::new("B"), 1, AttributeSet::new())
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut b = ProductRecord::new("B", "B", "test", Money::new(50_000));
        b.is_active = false;
        tx.save_product(&b).await.unwrap();
        tx.commit().await.unwrap();

        let view = carts.summary(&identity).await.unwrap();
        assert_eq!(view.lines.len(), 2);
        assert_eq!(view.summary.item_count, 1);
        assert_eq!(view.summary.subtotal, Money::new(200_000));
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let store = seeded_store().await;
        let carts = carts(&store);
        let identity = guest("s");
        for product in ["A", "B"] {
            carts
                .add_item(&identity, &ProductId::new(product), 1, AttributeSet::new())
                .await
                .unwrap();
        }

        assert_eq!(carts.clear(&identity).await.unwrap(), 2);
        assert_eq!(carts.clear(&identity).await.unwrap(), 0);
    }
}
