//! Catalog listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::Money;
use serde::Deserialize;
use store::{ProductQuery, ProductRecord};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListParams {
    fn into_query(self) -> Result<ProductQuery, ApiError> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ApiError::BadRequest(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        let mut query = ProductQuery::new()
            .active(self.active.unwrap_or(true))
            .limit(self.limit.unwrap_or(MAX_PAGE).min(MAX_PAGE));
        if let Some(category) = self.category {
            query = query.category(category);
        }
        if let Some(min) = self.min_price {
            query = query.min_price(Money::new(min));
        }
        if let Some(max) = self.max_price {
            query = query.max_price(Money::new(max));
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

/// GET /products: active products by default, filtered by the query string.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    let query = params.into_query()?;

    let mut tx = state.store.begin().await?;
    let products = tx.find_products(&query).await;
    tx.rollback().await?;

    Ok(Json(products?))
}
