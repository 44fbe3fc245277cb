//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use serde_json::{Value, json};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Checkout error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

/// Status, machine-readable code, message and optional details of an error body.
struct ErrorBody {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl ErrorBody {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::NotFound(msg) => ErrorBody::new(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => ErrorBody::new(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Domain(err) => domain_error_body(err),
            ApiError::Checkout(err) => checkout_error_body(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
            }
        };

        let mut json = json!({ "error": body.message, "code": body.code });
        if let Some(details) = body.details {
            json["details"] = details;
        }
        (body.status, axum::Json(json)).into_response()
    }
}

fn domain_error_body(err: DomainError) -> ErrorBody {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => ErrorBody::new(StatusCode::BAD_REQUEST, "validation", message),
        DomainError::NotFound { .. } => ErrorBody::new(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::ProductUnavailable(_) => {
            ErrorBody::new(StatusCode::CONFLICT, "product_unavailable", message)
        }
        DomainError::Conflict(issues) => ErrorBody::new(StatusCode::CONFLICT, "conflict", message)
            .with_details(json!({ "lines": issues })),
        DomainError::InsufficientStock {
            variant,
            available,
            requested,
        } => ErrorBody::new(StatusCode::CONFLICT, "insufficient_stock", message).with_details(
            json!({
                "variant": variant.to_string(),
                "available": available,
                "requested": requested,
            }),
        ),
        DomainError::Coupon(coupon_err) => {
            ErrorBody::new(StatusCode::UNPROCESSABLE_ENTITY, coupon_err.reason(), message)
        }
        DomainError::Busy(_) => {
            ErrorBody::new(StatusCode::SERVICE_UNAVAILABLE, "busy", message)
                .with_details(json!({ "retryable": true }))
        }
        DomainError::Store(store_err) => store_error_body(store_err),
    }
}

fn store_error_body(err: StoreError) -> ErrorBody {
    tracing::error!(error = %err, "store error");
    let retryable = err.is_retryable();
    ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        .with_details(json!({ "retryable": retryable }))
}

fn checkout_error_body(err: CheckoutError) -> ErrorBody {
    let message = err.to_string();
    match err {
        CheckoutError::Domain(domain_err) => domain_error_body(domain_err),
        CheckoutError::EmptyCart => ErrorBody::new(StatusCode::BAD_REQUEST, "empty_cart", message),
        CheckoutError::Validation(_) => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "validation", message)
        }
        CheckoutError::InvalidTransition { .. } | CheckoutError::Notification(_) => {
            tracing::error!(error = %message, "checkout internal error");
            ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Domain(err.into())
    }
}

#[cfg(test)]
mod tests {
    use common::VariantKey;
    use domain::CouponError;

    use super::*;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn insufficient_stock_is_conflict_with_details() {
        let (status, body) = render(ApiError::Domain(DomainError::InsufficientStock {
            variant: VariantKey::new("TEE", Some("M".into())),
            available: 1,
            requested: 3,
        }))
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "insufficient_stock");
        assert_eq!(body["details"]["available"], 1);
        assert_eq!(body["details"]["requested"], 3);
    }

    #[tokio::test]
    async fn coupon_errors_are_unprocessable() {
        let (status, body) = render(ApiError::Domain(DomainError::Coupon(
            CouponError::UsageExceeded("SAVE10".into()),
        )))
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "usage_exceeded");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn busy_is_service_unavailable() {
        let err: ApiError = StoreError::Busy {
            resource: "coupon SAVE10".into(),
        }
        .into();
        let (status, body) = render(err).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["details"]["retryable"], true);
    }

    #[tokio::test]
    async fn empty_cart_is_bad_request() {
        let (status, body) = render(ApiError::Checkout(CheckoutError::EmptyCart)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_cart");
    }
}
