//! Checkout and order lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CheckoutReceipt, CheckoutRequest};
use common::OrderId;
use serde::Deserialize;
use store::OrderRecord;

use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub shipping_address: String,
    pub payment_method: String,
}

/// POST /checkout: places an order for the caller's cart.
#[tracing::instrument(skip(state, identity, body), fields(identity = %identity.0))]
pub async fn place(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    let coupon_code = body
        .coupon_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    let receipt = state
        .checkout
        .checkout(CheckoutRequest {
            identity: identity.0,
            coupon_code,
            shipping_address: body.shipping_address,
            payment_method: body.payment_method,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderRecord>, ApiError> {
    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID format: {e}")))?;
    let order = state
        .checkout
        .order(&identity.0, OrderId::from_uuid(uuid))
        .await?;
    Ok(Json(order))
}
