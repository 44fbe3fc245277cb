//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::state::{SharedNotifier, SharedStore};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::InMemoryNotificationService;
use domain::{PricingConfig, PricingEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> axum::Router {
    let store = InMemoryStore::new();
    api::demo::seed(&store).await.unwrap();

    let store: SharedStore = Arc::new(store);
    let notifier: SharedNotifier = Arc::new(InMemoryNotificationService::new());
    let state = Arc::new(AppState::new(
        store,
        PricingEngine::new(PricingConfig::default()),
        notifier,
    ));
    api::create_app(state, get_metrics_handle())
}

const SESSION: &str = "guest-session-1";

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn guest() -> [(&'static str, &'static str); 1] {
    [("x-session-id", SESSION)]
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_list_products_filters_by_category() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/products?category=apparel", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    let products = json.as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert!(products.iter().all(|p| p["category"] == "apparel"));
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/cart", &[], None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_add_items_and_view_cart() {
    let app = setup().await;

    let (status, line) = send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(line["quantity"], 2);
    assert_eq!(line["unit_price"], 80_000);

    let (status, cart) = send(&app, "GET", "/cart", &guest(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(cart["summary"]["subtotal"], 160_000);
    assert_eq!(cart["summary"]["tax"], 16_000);
    assert_eq!(cart["summary"]["shipping"], 30_000);
    assert_eq!(cart["summary"]["grand_total"], 206_000);
}

#[tokio::test]
async fn test_add_beyond_stock_is_conflict() {
    let app = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "TOTE", "quantity": 6 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");
    assert_eq!(json["details"]["available"], 5);
    assert_eq!(json["details"]["requested"], 6);
}

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let app = setup().await;
    let (_, line) = send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "TEE-BASIC", "quantity": 1, "attributes": { "size": "M" } })),
    )
    .await;
    let line_id = line["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/cart/lines/{line_id}"),
        &guest(),
        Some(json!({ "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], true);

    let (_, cart) = send(&app, "GET", "/cart", &guest(), None).await;
    assert!(cart["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_line_id_is_bad_request() {
    let app = setup().await;

    let (status, _) = send(&app, "DELETE", "/cart/lines/not-a-uuid", &guest(), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_coupon_is_unprocessable() {
    let app = setup().await;
    send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 2 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/cart/coupon",
        &guest(),
        Some(json!({ "code": "NOPE" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn test_coupon_preview_discounts_cart() {
    let app = setup().await;
    send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 2 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/cart/coupon",
        &guest(),
        Some(json!({ "code": "save10" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], "SAVE10");
    assert_eq!(json["discount"], 16_000);
    assert_eq!(json["summary"]["coupon_code"], "SAVE10");
}

#[tokio::test]
async fn test_merge_requires_user() {
    let app = setup().await;

    let (status, _) = send(
        &app,
        "POST",
        "/cart/merge",
        &guest(),
        Some(json!({ "session_id": SESSION })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_merge_then_checkout_as_user() {
    let app = setup().await;
    let user_id = uuid::Uuid::new_v4().to_string();
    let user = [("x-user-id", user_id.as_str())];

    send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 1 })),
    )
    .await;

    let (status, report) = send(
        &app,
        "POST",
        "/cart/merge",
        &user,
        Some(json!({ "session_id": SESSION })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["moved"], 1);

    let (status, receipt) = send(
        &app,
        "POST",
        "/checkout",
        &user,
        Some(json!({ "shipping_address": "1 Main St", "payment_method": "cod" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_number = receipt["order_number"].as_str().unwrap();
    assert!(order_number.starts_with("ORD-"));

    let order_id = receipt["order_id"].as_str().unwrap().to_string();
    let (status, order) = send(&app, "GET", &format!("/orders/{order_id}"), &user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["order_number"], order_number);
    assert_eq!(order["lines"].as_array().unwrap().len(), 1);

    let (_, cart) = send(&app, "GET", "/cart", &user, None).await;
    assert!(cart["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_order_is_hidden_from_other_identities() {
    let app = setup().await;
    send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 1 })),
    )
    .await;
    let (_, receipt) = send(
        &app,
        "POST",
        "/checkout",
        &guest(),
        Some(json!({ "shipping_address": "1 Main St", "payment_method": "card" })),
    )
    .await;
    let order_id = receipt["order_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-session-id", "someone-else")],
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_empty_cart_is_bad_request() {
    let app = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/checkout",
        &guest(),
        Some(json!({ "shipping_address": "1 Main St", "payment_method": "cod" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "empty_cart");
}

#[tokio::test]
async fn test_reconcile_clean_cart() {
    let app = setup().await;
    send(
        &app,
        "POST",
        "/cart/items",
        &guest(),
        Some(json!({ "product_id": "MUG", "quantity": 1 })),
    )
    .await;

    let (status, report) = send(&app, "POST", "/cart/reconcile", &guest(), None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(report["adjustments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
