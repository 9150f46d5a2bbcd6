//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CartError, CheckoutError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout failure.
    Checkout(CheckoutError),
    /// Cart mutation failure.
    Cart(CartError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Cart(err) => cart_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, reason, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message, "reason": reason });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        CheckoutError::EmptyCart | CheckoutError::MissingShippingAddress => StatusCode::BAD_REQUEST,
        CheckoutError::ProductNotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::StockChanged { .. }
        | CheckoutError::InsufficientStock { .. }
        | CheckoutError::AlreadyInProgress(_) => StatusCode::CONFLICT,
        CheckoutError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CheckoutError::Persistence(_)
        | CheckoutError::Store(_)
        | CheckoutError::InvalidOrder(_)
        | CheckoutError::CompensationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.reason().as_str(), err.to_string())
}

fn cart_error_to_response(err: CartError) -> (StatusCode, &'static str, String) {
    let (status, reason) = match &err {
        CartError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, "invalid_quantity"),
        CartError::ExceedsStock { .. } => (StatusCode::CONFLICT, "exceeds_stock"),
        CartError::ProductUnavailable(_) => (StatusCode::NOT_FOUND, "product_unavailable"),
        CartError::LineNotFound(_) => (StatusCode::NOT_FOUND, "line_not_found"),
        CartError::Domain(_) | CartError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        }
    };
    (status, reason, err.to_string())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}
