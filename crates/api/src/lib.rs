//! HTTP API for the storefront checkout engine.
//!
//! Exposes cart, coupon, checkout and catalog endpoints over a shared
//! [`store::Store`], with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod demo;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list))
        .route("/cart", get(routes::cart::get).delete(routes::cart::clear))
        .route("/cart/items", post(routes::cart::add_item))
        .route(
            "/cart/lines/{id}",
            put(routes::cart::update_line).delete(routes::cart::remove_line),
        )
        .route("/cart/coupon", post(routes::cart::apply_coupon))
        .route("/cart/merge", post(routes::cart::merge))
        .route("/cart/reconcile", post(routes::cart::reconcile))
        .route("/checkout", post(routes::checkout::place))
        .route("/orders/{id}", get(routes::checkout::get_order))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
