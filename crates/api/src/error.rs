//! API error types with HTTP response mapping.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use order_store::StoreError;

/// Seconds a client should wait before retrying after a lock timeout.
const RETRY_AFTER_SECS: &str = "1";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Cart or checkout error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = axum::Json(serde_json::json!({ "error": message, "code": code }));
        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        CheckoutError::InsufficientStock { .. } | CheckoutError::CartChanged { .. } => {
            StatusCode::CONFLICT
        }
        CheckoutError::EmptyCart | CheckoutError::TotalOverflow => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        CheckoutError::Order(_) | CheckoutError::Store(_) => {
            tracing::error!(error = %err, "checkout internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.reason(), err.user_message())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Checkout(err.into())
    }
}
