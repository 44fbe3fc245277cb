//! Cart endpoints. The cart owner comes from the identity headers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::ReconciliationReport;
use common::{AttributeSet, CartIdentity, CartLineId, Money, ProductId, SessionId};
use domain::{CartSummary, CartView, MergeReport, QuantityUpdate};
use serde::{Deserialize, Serialize};
use store::CartLineRecord;

use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub session_id: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(untagged)]
pub enum UpdateResponse {
    Updated(CartLineRecord),
    Removed { removed: bool },
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

#[derive(Serialize)]
pub struct CouponResponse {
    pub code: String,
    pub discount: Money,
    pub summary: CartSummary,
}

// -- Handlers --

/// GET /cart: lines with product status plus the priced summary.
#[tracing::instrument(skip(state, identity), fields(identity = %identity.0))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.summary(&identity.0).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, identity, req), fields(identity = %identity.0, product = %req.product_id))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLineRecord>), ApiError> {
    let attributes = AttributeSet::from_pairs(req.attributes)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let line = state
        .carts
        .add_item(
            &identity.0,
            &ProductId::new(req.product_id),
            req.quantity,
            attributes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PUT /cart/lines/{id}: a quantity of zero or less removes the line.
#[tracing::instrument(skip(state, identity, req), fields(identity = %identity.0))]
pub async fn update_line(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let line_id = parse_line_id(&id)?;
    let response = match state
        .carts
        .update_quantity(&identity.0, line_id, req.quantity)
        .await?
    {
        QuantityUpdate::Updated(line) => UpdateResponse::Updated(line),
        QuantityUpdate::Removed => UpdateResponse::Removed { removed: true },
    };
    Ok(Json(response))
}

/// DELETE /cart/lines/{id}
#[tracing::instrument(skip(state, identity), fields(identity = %identity.0))]
pub async fn remove_line(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id = parse_line_id(&id)?;
    state.carts.remove_item(&identity.0, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart
#[tracing::instrument(skip(state, identity), fields(identity = %identity.0))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.carts.clear(&identity.0).await?;
    Ok(Json(ClearResponse { removed }))
}

/// POST /cart/coupon: prices the cart with a coupon without redeeming it.
#[tracing::instrument(skip(state, identity, req), fields(identity = %identity.0))]
pub async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<CouponResponse>, ApiError> {
    let applied = state.carts.apply_coupon(&identity.0, &req.code).await?;
    Ok(Json(CouponResponse {
        code: applied.coupon.code,
        discount: applied.discount,
        summary: applied.summary,
    }))
}

/// POST /cart/merge: folds a guest session's cart into the calling user's cart.
#[tracing::instrument(skip(state, identity, req), fields(identity = %identity.0))]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<MergeRequest>,
) -> Result<Json<MergeReport>, ApiError> {
    let CartIdentity::User(user_id) = identity.0 else {
        return Err(ApiError::BadRequest(
            "merging a guest cart requires an authenticated user".to_string(),
        ));
    };
    let session_id = req.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id must not be blank".to_string()));
    }

    let report = state
        .carts
        .transfer_guest_cart_to_user(&SessionId::new(session_id), user_id)
        .await?;
    Ok(Json(report))
}

/// POST /cart/reconcile: repairs the cart against current stock and prices.
#[tracing::instrument(skip(state, identity), fields(identity = %identity.0))]
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ReconciliationReport>, ApiError> {
    Ok(Json(state.reconciliation.reconcile_cart(&identity.0).await?))
}

fn parse_line_id(id: &str) -> Result<CartLineId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid line ID format: {e}")))?;
    Ok(CartLineId::from(uuid))
}
