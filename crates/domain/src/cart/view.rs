use common::Money;
use serde::Serialize;
use store::{CartLineRecord, ProductRecord};

use crate::pricing::CartSummary;

/// A cart line joined with the current state of its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLineRecord,
    pub product_name: Option<String>,
    /// False when the product is inactive or no longer exists.
    pub product_active: bool,
    pub current_price: Option<Money>,
    pub line_total: Money,
}

impl CartLineView {
    pub fn new(
        line: CartLineRecord,
        product_name: Option<String>,
        product_active: bool,
        current_price: Option<Money>,
    ) -> Self {
        let line_total = line.line_total();
        Self {
            line,
            product_name,
            product_active,
            current_price,
            line_total,
        }
    }

    pub fn from_product(line: CartLineRecord, product: Option<&ProductRecord>) -> Self {
        match product {
            Some(product) => Self::new(
                line,
                Some(product.name.clone()),
                product.is_active,
                Some(product.price),
            ),
            None => Self::new(line, None, false, None),
        }
    }

    /// True when the captured price no longer matches the catalog.
    pub fn price_changed(&self) -> bool {
        self.current_price
            .is_some_and(|current| current != self.line.unit_price)
    }
}

/// Lines of one cart together with their priced summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub summary: CartSummary,
}

/// Outcome of a quantity update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityUpdate {
    Updated(CartLineRecord),
    /// A non-positive quantity removed the line.
    Removed,
}

/// Counts from merging a guest cart into a user cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Guest lines re-owned by the user unchanged.
    pub moved: usize,
    /// Guest lines folded into an existing user line.
    pub merged: usize,
}
